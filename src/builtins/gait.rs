use super::{Animation, has_signature};
use crate::proxy::ResourceProxy;
use exn::OptionExt;
use quarry_registry::LoaderRecord;
use quarry_source::Resolver;
use quarry_storage::PipeHandle;
use quarry_storage::error::{ErrorKind, Result};

pub(crate) const SHEBANG: &[u8] = b"#!";

/// Animation and stride length for one way of moving.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaitMode {
    pub animation: Option<ResourceProxy<Animation>>,
    pub stride: f32,
}

/// How a character moves: the animations to play and how far each cycle
/// carries it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gait {
    pub run: GaitMode,
    pub sneak: GaitMode,
    pub turn: GaitMode,
    pub walk: GaitMode,
}

impl Gait {
    fn mode(&mut self, section: &str) -> Option<&mut GaitMode> {
        match section {
            "run" => Some(&mut self.run),
            "sneak" => Some(&mut self.sneak),
            "turn" => Some(&mut self.turn),
            "walk" => Some(&mut self.walk),
            _ => None,
        }
    }
}

fn unknown(key: &str) -> ErrorKind {
    ErrorKind::Format(format!("unknown gait key: {key}"))
}

/// Parse `key = value` lines after the shebang line.
///
/// A line holding only a section name (`walk`) makes bare keys below it
/// (`stride = 1.2`) relative to that section, so it reads the same as
/// `walk.stride = 1.2`.
fn parse(text: &str, resolver: &Resolver) -> Result<Gait> {
    let mut gait = Gait::default();
    let mut section: Option<&str> = None;
    for line in text.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            if gait.mode(line).is_none() {
                exn::bail!(unknown(line));
            }
            section = Some(line);
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        let (mode, field) = match (key.split_once('.'), section) {
            (Some((mode, field)), _) => (mode, field),
            (None, Some(mode)) => (mode, key),
            (None, None) => exn::bail!(unknown(key)),
        };
        let mode = gait.mode(mode).ok_or_raise(|| unknown(key))?;
        match field {
            "animation" => mode.animation = Some(ResourceProxy::new(value, resolver.clone())),
            "stride" => {
                mode.stride = value
                    .parse()
                    .map_err(|_| ErrorKind::Format(format!("invalid stride for {key}: {value}")))?;
            },
            _ => exn::bail!(unknown(key)),
        }
    }
    Ok(gait)
}

pub(crate) fn loader(resolver: Resolver) -> LoaderRecord {
    LoaderRecord::new("native gait", move |pipe: &PipeHandle| {
        let mut stream = pipe.open()?;
        if !stream.check_signature(SHEBANG)? {
            return Ok(None);
        }
        Ok(Some(parse(&stream.get_text()?, &resolver)?))
    })
    .compatible(|pipe: &PipeHandle| has_signature(pipe, SHEBANG))
    .extensions(["gait", "qgait"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_dotted_and_sections() {
        let text = [
            "#!gait",
            "# comment",
            "",
            "walk.animation = anim/walk.anim",
            "walk.stride = 1.5",
            "run",
            "  stride = 3",
            "  animation = anim/run.anim",
        ]
        .join("\n");
        let gait = parse(&text, &Resolver::new()).unwrap();
        assert_eq!(gait.walk.stride, 1.5);
        assert_eq!(gait.walk.animation.as_ref().map(ResourceProxy::path), Some("anim/walk.anim"));
        assert_eq!(gait.run.stride, 3.0);
        assert_eq!(gait.run.animation.as_ref().map(ResourceProxy::path), Some("anim/run.anim"));
        assert!(gait.sneak.animation.is_none());
        assert!(!gait.walk.animation.as_ref().unwrap().is_resolved());
    }

    #[rstest]
    #[case("walk.speed = 2", "unknown gait key: walk.speed")]
    #[case("fly.stride = 2", "unknown gait key: fly.stride")]
    #[case("stride = 2", "unknown gait key: stride")]
    #[case("hop", "unknown gait key: hop")]
    #[case("walk.stride = far", "invalid stride for walk.stride: far")]
    fn test_parse_errors(#[case] line: &str, #[case] message: &str) {
        let err = parse(&format!("#!gait\n{line}\n"), &Resolver::new()).unwrap_err();
        assert_eq!(*err, ErrorKind::Format(message.into()));
    }
}
