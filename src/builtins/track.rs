use super::{ReadLe, has_signature, reserve};
use quarry_registry::LoaderRecord;
use quarry_storage::PipeHandle;
use quarry_storage::error::{ErrorKind, Result};

pub(crate) const SIGNATURE: &[u8] = b"QTRACK\0\x01";

/// One triangle of a track surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub vertices: [[f32; 3]; 3],
    /// Index of the face across edge `i` (from vertex `i` to `i + 1`).
    pub neighbours: [Option<usize>; 3],
}

impl Face {
    /// Unit surface normal, or zero for a degenerate face.
    pub fn normal(&self) -> [f32; 3] {
        let [a, b, c] = self.vertices;
        let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let n = [u[1] * v[2] - u[2] * v[1], u[2] * v[0] - u[0] * v[2], u[0] * v[1] - u[1] * v[0]];
        let length = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        match length > f32::EPSILON {
            true => n.map(|x| x / length),
            false => [0.0; 3],
        }
    }
}

/// Walkable surface made of connected triangles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub faces: Vec<Face>,
}

fn load_track(pipe: &PipeHandle) -> Result<Option<Track>> {
    let mut stream = pipe.open()?;
    if !stream.check_signature(SIGNATURE)? {
        return Ok(None);
    }
    stream.seek(SIGNATURE.len() as u64)?;
    let count = stream.u32_le()?;
    let mut faces = Vec::with_capacity(reserve(count));
    for _ in 0..count {
        let mut vertices = [[0.0; 3]; 3];
        for vertex in &mut vertices {
            *vertex = stream.f32s_le::<3>()?;
        }
        let mut neighbours = [None; 3];
        for neighbour in &mut neighbours {
            *neighbour = match stream.i32_le()? {
                -1 => None,
                i if i >= 0 && (i as u32) < count => Some(i as usize),
                _ => exn::bail!(ErrorKind::Format("face index out of range".into())),
            };
        }
        faces.push(Face { vertices, neighbours });
    }
    Ok(Some(Track { faces }))
}

/// Neighbouring faces must share the edge that links them, as seen from
/// above.
fn check_continuity(track: &Track) -> Result<()> {
    for face in &track.faces {
        for (i, neighbour) in face.neighbours.iter().enumerate() {
            let Some(neighbour) = neighbour.and_then(|n| track.faces.get(n)) else {
                continue;
            };
            let edge = [face.vertices[i], face.vertices[(i + 1) % 3]];
            let matches = neighbour
                .vertices
                .iter()
                .filter(|v| edge.iter().any(|e| e[0] == v[0] && e[2] == v[2]))
                .count();
            if matches < 2 {
                exn::bail!(ErrorKind::Format("mismatched vertex in neighbouring face".into()));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slope {
    Good,
    Steep,
    Vertical,
    Back,
}

fn worst_slope(track: &Track) -> Slope {
    track
        .faces
        .iter()
        .map(|face| {
            let up = face.normal()[1];
            match up {
                _ if up.abs() <= f32::EPSILON => Slope::Vertical,
                _ if up < 0.0 => Slope::Back,
                _ if up < 0.5 => Slope::Steep,
                _ => Slope::Good,
            }
        })
        .max()
        .unwrap_or(Slope::Good)
}

pub(crate) fn post_load(track: &mut Track) -> Result<()> {
    check_continuity(track)?;
    match worst_slope(track) {
        Slope::Good => {},
        Slope::Steep => tracing::warn!("track contains steep faces"),
        Slope::Vertical => tracing::warn!("track contains vertical faces"),
        Slope::Back => tracing::warn!("track contains back-faces"),
    }
    Ok(())
}

pub(crate) fn loader() -> LoaderRecord {
    LoaderRecord::new("native track", load_track)
        .compatible(|pipe: &PipeHandle| has_signature(pipe, SIGNATURE))
        .mime_types(["application/x-quarry-track"])
        .extensions(["track", "qtrack"])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builtins::tests::pipe;
    use byteorder::{LittleEndian, WriteBytesExt};
    use quarry_registry::testing::count_warnings;

    pub(crate) fn encode(faces: &[([[f32; 3]; 3], [i32; 3])]) -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.write_u32::<LittleEndian>(faces.len() as u32).unwrap();
        for (vertices, neighbours) in faces {
            for value in vertices.iter().flatten() {
                bytes.write_f32::<LittleEndian>(*value).unwrap();
            }
            for neighbour in neighbours {
                bytes.write_i32::<LittleEndian>(*neighbour).unwrap();
            }
        }
        bytes
    }

    /// Two flat triangles sharing the edge (1,0,0)-(0,0,1).
    pub(crate) fn square() -> Vec<u8> {
        encode(&[
            ([[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]], [-1, 1, -1]),
            ([[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 1.0]], [0, -1, -1]),
        ])
    }

    #[test]
    fn test_load_square() {
        let mut track = load_track(&pipe("a.track", square())).unwrap().unwrap();
        assert_eq!(track.faces.len(), 2);
        assert_eq!(track.faces[0].neighbours, [None, Some(1), None]);
        assert_eq!(track.faces[0].normal(), [0.0, 1.0, 0.0]);
        let ((), warnings) = count_warnings(|| post_load(&mut track).unwrap());
        assert_eq!(warnings, 0);
    }

    #[test]
    fn test_neighbour_out_of_range() {
        let bytes = encode(&[([[0.0; 3]; 3], [-1, 1, -1])]);
        let err = load_track(&pipe("a.track", bytes)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Format(m) if m == "face index out of range"));

        let bytes = encode(&[([[0.0; 3]; 3], [-2, -1, -1])]);
        assert!(load_track(&pipe("a.track", bytes)).is_err());
    }

    #[test]
    fn test_truncated_track() {
        let mut bytes = square();
        bytes.truncate(bytes.len() - 4);
        let err = load_track(&pipe("a.track", bytes)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EndOfStream(_)));
    }

    #[test]
    fn test_wrong_signature() {
        assert!(load_track(&pipe("a.track", b"QTRACK\0\x02".to_vec())).unwrap().is_none());
    }

    #[test]
    fn test_discontinuous_neighbours() {
        let bytes = encode(&[
            ([[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]], [-1, 1, -1]),
            ([[5.0, 0.0, 5.0], [6.0, 0.0, 5.0], [5.0, 0.0, 6.0]], [-1, -1, -1]),
        ]);
        let mut track = load_track(&pipe("a.track", bytes)).unwrap().unwrap();
        let err = post_load(&mut track).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Format(m) if m.contains("mismatched vertex")));
    }

    #[test]
    fn test_back_faces_warn_once() {
        let bytes = encode(&[([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], [-1, -1, -1])]);
        let mut track = load_track(&pipe("a.track", bytes)).unwrap().unwrap();
        let ((), warnings) = count_warnings(|| post_load(&mut track).unwrap());
        assert_eq!(warnings, 1);
    }
}
