//! Built-in resource types and the scanners, loaders and savers for them.
//!
//! Everything here is registered by [`register_builtins`], once, before the
//! registries are shared.

mod animation;
mod archive;
mod gait;
mod image;
mod text;
mod track;

pub use self::animation::{Animation, Bone, Frame};
pub use self::gait::{Gait, GaitMode};
pub use self::image::{ChannelKind, Image};
pub use self::text::Text;
pub use self::track::{Face, Track};
use byteorder::{LittleEndian, ReadBytesExt};
use quarry_registry::Registries;
use quarry_source::Resolver;
use quarry_storage::error::Result;
use quarry_storage::stream::map_read_error;
use quarry_storage::{PipeHandle, Stream};
use std::io;

/// Populate `registries` with every built-in type, scanner, loader and
/// saver. Gaits refer to animations through `resolver`.
pub fn register_builtins(registries: &mut Registries, resolver: &Resolver) {
    registries
        .types
        .register_with_post_loader::<Image>("image", image::post_load)
        .register_with_post_loader::<Track>("track", track::post_load)
        .register_with_post_loader::<Animation>("animation", animation::post_load)
        .register::<Gait>("gait")
        .register::<Text>("text");

    registries.scanners.register(archive::scanner());

    registries
        .loaders
        .register(image::loader())
        .register(track::loader())
        .register(animation::loader())
        .register(gait::loader(resolver.clone()))
        .register(text::loader());

    registries.savers.register(image::saver()).register(text::saver());
}

/// Whether a fresh stream from `pipe` starts with `signature`. Unreadable
/// pipes don't match.
pub(crate) fn has_signature(pipe: &PipeHandle, signature: &[u8]) -> bool {
    pipe.open().and_then(|mut stream| stream.check_signature(signature)).unwrap_or(false)
}

/// Little-endian primitive reads that fail the way [`Stream::read`] does.
pub(crate) trait ReadLe {
    fn u32_le(&mut self) -> Result<u32>;
    fn i32_le(&mut self) -> Result<i32>;
    fn f32_le(&mut self) -> Result<f32>;
    fn f32s_le<const N: usize>(&mut self) -> Result<[f32; N]>;
}

impl ReadLe for Stream {
    fn u32_le(&mut self) -> Result<u32> {
        primitive(self, |s| s.read_u32::<LittleEndian>())
    }

    fn i32_le(&mut self) -> Result<i32> {
        primitive(self, |s| s.read_i32::<LittleEndian>())
    }

    fn f32_le(&mut self) -> Result<f32> {
        primitive(self, |s| s.read_f32::<LittleEndian>())
    }

    fn f32s_le<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut values = [0.0; N];
        primitive(self, |s| s.read_f32_into::<LittleEndian>(&mut values))?;
        Ok(values)
    }
}

fn primitive<T>(stream: &mut Stream, read: impl FnOnce(&mut Stream) -> io::Result<T>) -> Result<T> {
    match read(stream) {
        Ok(value) => Ok(value),
        Err(e) => exn::bail!(map_read_error(&e, stream.origin())),
    }
}

/// Capacity to reserve for `count` records read from a stream, capped so
/// that a corrupt count can't allocate before the reads fail.
pub(crate) fn reserve(count: u32) -> usize {
    (count as usize).min(4096)
}
