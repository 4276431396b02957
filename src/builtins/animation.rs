use super::{ReadLe, has_signature, reserve};
use exn::ResultExt;
use quarry_registry::LoaderRecord;
use quarry_storage::PipeHandle;
use quarry_storage::error::{ErrorKind, Result};
use std::collections::BTreeMap;

pub(crate) const SIGNATURE: &[u8] = b"QANIM\0\0\x01";

/// Bone pose at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub time: f32,
    pub position: [f32; 3],
    /// Quaternion, `[x, y, z, w]`.
    pub orientation: [f32; 4],
    pub scale: [f32; 3],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bone {
    /// Keyframes in ascending time order.
    pub frames: Vec<Frame>,
}

/// Skeletal keyframe animation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Animation {
    pub duration: f32,
    pub bones: BTreeMap<String, Bone>,
}

fn load_animation(pipe: &PipeHandle) -> Result<Option<Animation>> {
    let mut stream = pipe.open()?;
    if !stream.check_signature(SIGNATURE)? {
        return Ok(None);
    }
    stream.seek(SIGNATURE.len() as u64)?;
    let duration = stream.f32_le()?;
    let count = stream.u32_le()?;
    // Measured once: on decompressing pipes every size() rewinds the source.
    let size = stream.size()?;
    let mut bones = BTreeMap::new();
    for _ in 0..count {
        let length = u64::from(stream.u32_le()?);
        if length > size.saturating_sub(stream.tell()?) {
            exn::bail!(ErrorKind::EndOfStream(stream.origin().to_path_buf()));
        }
        let mut name = vec![0; length as usize];
        stream.read(&mut name)?;
        let name = String::from_utf8(name).or_raise(|| ErrorKind::Format("invalid bone name".into()))?;
        let frame_count = stream.u32_le()?;
        let mut frames = Vec::with_capacity(reserve(frame_count));
        for _ in 0..frame_count {
            frames.push(Frame {
                time: stream.f32_le()?,
                position: stream.f32s_le()?,
                orientation: stream.f32s_le()?,
                scale: stream.f32s_le()?,
            });
        }
        bones.insert(name, Bone { frames });
    }
    Ok(Some(Animation { duration, bones }))
}

pub(crate) fn post_load(animation: &mut Animation) -> Result<()> {
    for bone in animation.bones.values_mut() {
        if !bone.frames.is_sorted_by(|a, b| a.time <= b.time) {
            bone.frames.sort_by(|a, b| a.time.total_cmp(&b.time));
        }
    }
    Ok(())
}

pub(crate) fn loader() -> LoaderRecord {
    LoaderRecord::new("native animation", load_animation)
        .compatible(|pipe: &PipeHandle| has_signature(pipe, SIGNATURE))
        .mime_types(["application/x-quarry-animation"])
        .extensions(["anim", "qanim"])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builtins::tests::pipe;
    use byteorder::{LittleEndian, WriteBytesExt};
    use quarry_storage::stream::ReadSeek;
    use quarry_storage::{CompressedPipe, Compression, MemoryPipe, Pipe};
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn encode(duration: f32, bones: &[(&str, &[f32])]) -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.write_f32::<LittleEndian>(duration).unwrap();
        bytes.write_u32::<LittleEndian>(bones.len() as u32).unwrap();
        for (name, times) in bones {
            bytes.write_u32::<LittleEndian>(name.len() as u32).unwrap();
            bytes.extend_from_slice(name.as_bytes());
            bytes.write_u32::<LittleEndian>(times.len() as u32).unwrap();
            for time in *times {
                bytes.write_f32::<LittleEndian>(*time).unwrap();
                for value in [0.0, 0.0, *time, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0] {
                    bytes.write_f32::<LittleEndian>(value).unwrap();
                }
            }
        }
        bytes
    }

    #[test]
    fn test_load_and_sort() {
        let bytes = encode(2.0, &[("hip", &[0.0, 1.0][..]), ("knee", &[1.5, 0.5][..])]);
        let mut animation = load_animation(&pipe("walk.anim", bytes)).unwrap().unwrap();
        assert_eq!(animation.duration, 2.0);
        assert_eq!(animation.bones.len(), 2);
        assert_eq!(animation.bones["hip"].frames[1].position, [0.0, 0.0, 1.0]);
        assert_eq!(animation.bones["hip"].frames[1].orientation, [0.0, 0.0, 0.0, 1.0]);

        post_load(&mut animation).unwrap();
        let times: Vec<f32> = animation.bones["knee"].frames.iter().map(|f| f.time).collect();
        assert_eq!(times, [0.5, 1.5]);
    }

    #[derive(Debug)]
    struct CountingPipe {
        inner: MemoryPipe,
        opens: Arc<AtomicUsize>,
    }

    impl Pipe for CountingPipe {
        fn origin(&self) -> &Path {
            self.inner.origin()
        }

        fn open_raw(&self) -> Result<Box<dyn ReadSeek>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open_raw()
        }
    }

    #[test]
    fn test_many_bones_from_compressed_pipe() {
        let names: Vec<String> = (0..32).map(|i| format!("bone{i}")).collect();
        let bones: Vec<(&str, &[f32])> = names.iter().map(|name| (name.as_str(), &[0.0][..])).collect();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&encode(1.0, &bones)).unwrap();

        let opens = Arc::new(AtomicUsize::new(0));
        let inner = MemoryPipe::new("walk.anim.gz", encoder.finish().unwrap());
        let raw = CountingPipe { inner, opens: opens.clone() };
        let pipe: PipeHandle = Arc::new(CompressedPipe::new(Arc::new(raw), Compression::Gzip));
        let animation = load_animation(&pipe).unwrap().unwrap();
        assert_eq!(animation.bones.len(), 32);
        // Open, rewind after the signature check, rewind after measuring.
        assert_eq!(opens.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_truncated_bone_name() {
        let mut bytes = encode(1.0, &[("shoulder", &[][..])]);
        bytes.truncate(SIGNATURE.len() + 8 + 4 + 3);
        let err = load_animation(&pipe("a.anim", bytes)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EndOfStream(_)));
    }

    #[test]
    fn test_not_an_animation() {
        assert!(load_animation(&pipe("a.anim", b"QTRACK\0\x01".to_vec())).unwrap().is_none());
    }
}
