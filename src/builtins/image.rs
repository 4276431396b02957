use super::has_signature;
use derive_more::Display;
use exn::OptionExt;
use quarry_registry::{LoaderRecord, SaverRecord};
use quarry_storage::PipeHandle;
use quarry_storage::error::{ErrorKind, Result};
use std::io::Write;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display(rename_all = "lowercase")]
pub enum ChannelKind {
    Mono,
    Gray,
    Alpha,
    Red,
    Green,
    Blue,
}

/// Uncompressed raster, rows packed without padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub channels: Vec<ChannelKind>,
    /// Bits per channel.
    pub depth: u8,
    pub data: Vec<u8>,
}

impl Image {
    /// Bytes per row.
    pub fn pitch(&self) -> usize {
        (self.width as usize * self.channels.len() * self.depth as usize).div_ceil(8)
    }
}

fn channels_for(color: png::ColorType) -> Result<Vec<ChannelKind>> {
    use ChannelKind::*;
    Ok(match color {
        png::ColorType::Grayscale => vec![Mono],
        png::ColorType::GrayscaleAlpha => vec![Gray, Alpha],
        png::ColorType::Rgb => vec![Red, Green, Blue],
        png::ColorType::Rgba => vec![Red, Green, Blue, Alpha],
        png::ColorType::Indexed => exn::bail!(ErrorKind::Format("invalid color type".into())),
    })
}

fn color_for(channels: &[ChannelKind]) -> Result<png::ColorType> {
    use ChannelKind::*;
    Ok(match channels {
        [Mono] | [Gray] => png::ColorType::Grayscale,
        [Gray | Mono, Alpha] => png::ColorType::GrayscaleAlpha,
        [Red, Green, Blue] => png::ColorType::Rgb,
        [Red, Green, Blue, Alpha] => png::ColorType::Rgba,
        _ => {
            let layout = channels.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
            exn::bail!(ErrorKind::Format(format!("unsupported channel layout: {layout}")))
        },
    })
}

fn load_png(pipe: &PipeHandle) -> Result<Option<Image>> {
    let mut stream = pipe.open()?;
    if !stream.check_signature(PNG_SIGNATURE)? {
        return Ok(None);
    }
    let mut decoder = png::Decoder::new(stream);
    // Palettes become RGB, tRNS becomes alpha.
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder.read_info().map_err(|e| ErrorKind::platform("png", e))?;
    let mut data = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut data).map_err(|e| ErrorKind::platform("png", e))?;
    data.truncate(info.buffer_size());

    if info.width == 0 || info.height == 0 {
        exn::bail!(ErrorKind::Format("invalid image size".into()));
    }
    let depth = info.bit_depth as u8;
    let channels = channels_for(info.color_type)?;
    let decoded = info.line_size * 8 / (info.width as usize * depth as usize);
    if decoded != channels.len() {
        exn::bail!(ErrorKind::Format("channels do not match format".into()));
    }
    Ok(Some(Image { width: info.width, height: info.height, channels, depth, data }))
}

fn save_png(image: &Image, writer: &mut dyn Write) -> Result<()> {
    let color = color_for(&image.channels)?;
    let depth = png::BitDepth::from_u8(image.depth)
        .ok_or_raise(|| ErrorKind::Format(format!("unsupported bit depth: {}", image.depth)))?;
    let mut encoder = png::Encoder::new(writer, image.width, image.height);
    encoder.set_color(color);
    encoder.set_depth(depth);
    let mut png = encoder.write_header().map_err(|e| ErrorKind::platform("png", e))?;
    png.write_image_data(&image.data).map_err(|e| ErrorKind::platform("png", e))?;
    png.finish().map_err(|e| ErrorKind::platform("png", e))
}

pub(crate) fn post_load(image: &mut Image) -> Result<()> {
    if (image.width == 0) != (image.height == 0) {
        exn::bail!(ErrorKind::Format("invalid image size".into()));
    }
    if image.data.len() != image.pitch() * image.height as usize {
        exn::bail!(ErrorKind::Format("image data does not match its size".into()));
    }
    Ok(())
}

pub(crate) fn loader() -> LoaderRecord {
    LoaderRecord::new("png", load_png)
        .compatible(|pipe: &PipeHandle| has_signature(pipe, PNG_SIGNATURE))
        .mime_types(["image/png"])
        .extensions(["png"])
}

pub(crate) fn saver() -> SaverRecord {
    SaverRecord::new("png", save_png).formats(["png"]).extensions(["png"])
}
