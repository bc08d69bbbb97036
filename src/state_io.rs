// Persisted simulation-state codec
//
// Text stream layout:
//   - header line: vertex count, face (tangent-array) count, morphogen count
//   - one line per vertex: morphogen_count concentrations, then
//     morphogen_count reserved placeholders (always 1.0)
//   - one line per face: per morphogen, tangent x y z then the two
//     principal diffusion rates
//
// Loading parses into a staging structure and only then hands the result
// to the domain, so a failed load leaves existing state untouched.

use crate::diffusion::DiffusionTensor;
use crate::geometry::Vector3D;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StateIoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed header (expected three integers)")]
    Header,

    #[error("truncated state: expected {expected} data lines, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("malformed value on line {line}")]
    Parse { line: usize },
}

/// A fully parsed state file, not yet applied to any domain.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedState {
    pub vertex_count: usize,
    pub face_count: usize,
    pub morphogen_count: usize,
    /// Vertex-major, morphogen-minor concentrations.
    pub concentrations: Vec<f64>,
    /// Reserved per-vertex placeholders; always written as 1.0.
    pub reserved: Vec<f64>,
    /// Per-face, per-morphogen tensors.
    pub tensors: Vec<Vec<DiffusionTensor>>,
}

impl SavedState {
    /// Capture the persistable state of a cell store and tensor table.
    pub fn capture(
        read_buffer: &[f64],
        morphogen_count: usize,
        tensors: Vec<Vec<DiffusionTensor>>,
    ) -> Self {
        let vertex_count = if morphogen_count == 0 {
            0
        } else {
            read_buffer.len() / morphogen_count
        };
        Self {
            vertex_count,
            face_count: tensors.len(),
            morphogen_count,
            concentrations: read_buffer.to_vec(),
            reserved: vec![1.0; vertex_count * morphogen_count],
            tensors,
        }
    }
}

/// Read a state stream. Any failure leaves the caller's state untouched
/// because nothing is applied until the full parse succeeds.
pub fn read_state<R: BufRead>(reader: R) -> Result<SavedState, StateIoError> {
    let mut lines = reader.lines().enumerate();

    let (_, header) = lines.next().ok_or(StateIoError::Header)?;
    let header = header?;
    let mut fields = header.split_whitespace();
    let vertex_count: usize = fields
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or(StateIoError::Header)?;
    let face_count: usize = fields
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or(StateIoError::Header)?;
    let morphogen_count: usize = fields
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or(StateIoError::Header)?;

    // Header counts are untrusted: no pre-reservation, checked arithmetic
    // only. Data gathers incrementally and a short stream fails as
    // Truncated long before the claimed counts matter.
    if vertex_count.checked_mul(morphogen_count).is_none() {
        return Err(StateIoError::Header);
    }
    let expected = vertex_count
        .checked_add(face_count)
        .ok_or(StateIoError::Header)?;

    let mut concentrations = Vec::new();
    let mut reserved = Vec::new();
    let mut tensors = Vec::new();
    let mut read_lines = 0usize;

    for _ in 0..vertex_count {
        let (line_no, line) = lines.next().ok_or(StateIoError::Truncated {
            expected,
            found: read_lines,
        })?;
        let line = line?;
        read_lines += 1;

        let values = parse_floats(&line, 2 * morphogen_count, line_no + 1)?;
        concentrations.extend_from_slice(&values[..morphogen_count]);
        reserved.extend_from_slice(&values[morphogen_count..]);
    }

    for _ in 0..face_count {
        let (line_no, line) = lines.next().ok_or(StateIoError::Truncated {
            expected,
            found: read_lines,
        })?;
        let line = line?;
        read_lines += 1;

        let values = parse_floats(&line, 5 * morphogen_count, line_no + 1)?;
        let row = (0..morphogen_count)
            .map(|m| {
                let v = &values[m * 5..(m + 1) * 5];
                DiffusionTensor {
                    direction: Vector3D::new(v[0], v[1], v[2]),
                    rate_low: v[3],
                    rate_high: v[4],
                }
            })
            .collect();
        tensors.push(row);
    }

    Ok(SavedState {
        vertex_count,
        face_count,
        morphogen_count,
        concentrations,
        reserved,
        tensors,
    })
}

fn parse_floats(line: &str, expected: usize, line_no: usize) -> Result<Vec<f64>, StateIoError> {
    let values: Result<Vec<f64>, _> = line.split_whitespace().map(str::parse).collect();
    let values = values.map_err(|_| StateIoError::Parse { line: line_no })?;
    if values.len() != expected {
        return Err(StateIoError::Parse { line: line_no });
    }
    Ok(values)
}

/// Write a state stream in the exact persisted layout.
pub fn write_state<W: Write>(mut writer: W, state: &SavedState) -> Result<(), StateIoError> {
    writeln!(
        writer,
        "{} {} {}",
        state.vertex_count, state.face_count, state.morphogen_count
    )?;

    let m = state.morphogen_count;
    for v in 0..state.vertex_count {
        let mut fields = Vec::with_capacity(2 * m);
        for i in 0..m {
            fields.push(format_float(state.concentrations[v * m + i]));
        }
        for _ in 0..m {
            fields.push("1".to_string());
        }
        writeln!(writer, "{}", fields.join(" "))?;
    }

    for row in &state.tensors {
        let mut fields = Vec::with_capacity(5 * m);
        for t in row {
            fields.push(format_float(t.direction.x));
            fields.push(format_float(t.direction.y));
            fields.push(format_float(t.direction.z));
            fields.push(format_float(t.rate_low));
            fields.push(format_float(t.rate_high));
        }
        writeln!(writer, "{}", fields.join(" "))?;
    }

    Ok(())
}

// Rust's shortest-round-trip float formatting keeps save/load lossless.
fn format_float(v: f64) -> String {
    format!("{}", v)
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<SavedState, StateIoError> {
    let file = File::open(path)?;
    read_state(BufReader::new(file))
}

pub fn save_to_path<P: AsRef<Path>>(path: P, state: &SavedState) -> Result<(), StateIoError> {
    let file = File::create(path)?;
    write_state(BufWriter::new(file), state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> SavedState {
        let tensors = vec![
            vec![
                DiffusionTensor {
                    rate_low: 0.25,
                    rate_high: 2.0,
                    direction: Vector3D::new(1.0, 0.0, 0.0),
                },
                DiffusionTensor {
                    rate_low: 1.0,
                    rate_high: 1.0,
                    direction: Vector3D::new(0.0, 1.0, 0.0),
                },
            ];
            3
        ];
        SavedState::capture(&[0.1, 0.9, 0.25, 0.75], 2, tensors)
    }

    #[test]
    fn test_round_trip_is_identical() {
        let state = sample_state();
        let mut buf = Vec::new();
        write_state(&mut buf, &state).unwrap();

        let loaded = read_state(buf.as_slice()).unwrap();
        assert_eq!(loaded, state);

        // Re-saving reproduces the byte-identical stream
        let mut buf2 = Vec::new();
        write_state(&mut buf2, &loaded).unwrap();
        assert_eq!(buf, buf2);
    }

    #[test]
    fn test_header_counts() {
        let state = sample_state();
        let mut buf = Vec::new();
        write_state(&mut buf, &state).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("2 3 2\n"));
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        let err = read_state("2 x 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, StateIoError::Header));

        let err = read_state("".as_bytes()).unwrap_err();
        assert!(matches!(err, StateIoError::Header));
    }

    #[test]
    fn test_absurd_header_counts_are_rejected() {
        // A hostile header must fail gracefully, not overflow or allocate
        let huge = format!("{} 0 2\n", u64::MAX);
        let err = read_state(huge.as_bytes()).unwrap_err();
        assert!(matches!(err, StateIoError::Header));

        let huge = format!("4 {} 1\n", u64::MAX);
        let err = read_state(huge.as_bytes()).unwrap_err();
        assert!(matches!(err, StateIoError::Header));

        // Plausible but unbacked counts fail as truncation
        let err = read_state("1000000 0 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, StateIoError::Truncated { found: 0, .. }));
    }

    #[test]
    fn test_truncated_stream_is_rejected() {
        let err = read_state("2 0 1\n0.5 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, StateIoError::Truncated { .. }));
    }

    #[test]
    fn test_wrong_field_count_is_rejected() {
        // Vertex line must carry 2 * morphogen_count floats
        let err = read_state("1 0 2\n0.5 0.5 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, StateIoError::Parse { line: 2 }));
    }
}
