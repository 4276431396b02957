use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, miette};
use quarry::builtins::{Animation, Gait, GaitMode, Image, Text, Track};
use quarry::{ConfigLoader, ResourceSystem};
use quarry_config::split_arguments;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quarry", version, about = "Inspect and convert mounted game resources")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log every indexed path
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every indexed path
    List {
        #[command(flatten)]
        mount: Mount,
    },
    /// Write the raw bytes of a resource to stdout
    Cat {
        path: String,
        #[command(flatten)]
        mount: Mount,
    },
    /// Print a text resource with normalized line endings
    Text {
        path: String,
        #[command(flatten)]
        mount: Mount,
    },
    /// Load a resource and summarize it
    Info {
        path: String,
        #[command(flatten)]
        mount: Mount,
    },
    /// Load an image and save it in another format
    Convert {
        path: String,
        output: PathBuf,
        /// Output format; picked from the output extension when omitted
        #[arg(short, long)]
        format: Option<String>,
        #[command(flatten)]
        mount: Mount,
    },
}

impl Command {
    fn mount(&self) -> &Mount {
        match self {
            Self::List { mount } => mount,
            Self::Cat { mount, .. } | Self::Text { mount, .. } | Self::Info { mount, .. } => mount,
            Self::Convert { mount, .. } => mount,
        }
    }
}

#[derive(Args, Debug)]
struct Mount {
    /// Extra sources to mount, and `key=value` configuration overrides
    #[arg(value_name = "SOURCE|KEY=VALUE")]
    args: Vec<String>,
}

fn report<E: std::error::Error + Send + Sync + 'static>(err: exn::Exn<E>) -> miette::Report {
    miette!("{err:?}")
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let (sources, overrides) = split_arguments(&cli.command.mount().args);
    let mut config = ConfigLoader::new().file(cli.config.clone()).overrides(overrides).load().map_err(report)?;
    config.resource.verbose |= cli.verbose;
    init_tracing(config.resource.verbose);

    let system = ResourceSystem::new(&config, &sources).map_err(report)?;
    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Command::List { .. } => {
            for path in system.index().paths() {
                writeln!(stdout, "{path}").into_diagnostic()?;
            }
        },
        Command::Cat { path, .. } => {
            let bytes = system.open(path).and_then(|mut stream| stream.read_to_end()).map_err(report)?;
            stdout.write_all(&bytes).into_diagnostic()?;
        },
        Command::Text { path, .. } => {
            let text = match system.load::<Text>(path) {
                Ok(text) => text.0.clone(),
                Err(err) if err.is_not_found() => system.load_string(path).map_err(report)?,
                Err(err) => return Err(report(err)),
            };
            write!(stdout, "{text}").into_diagnostic()?;
        },
        Command::Info { path, .. } => {
            let summary = summarize(&system, path)?;
            writeln!(stdout, "{summary}").into_diagnostic()?;
        },
        Command::Convert { path, output, format, .. } => {
            let image = system.load::<Image>(path).map_err(report)?;
            let written = system.save(&*image, output, format.as_deref()).map_err(report)?;
            writeln!(stdout, "{}", written.display()).into_diagnostic()?;
        },
    }
    Ok(())
}

/// Try each built-in type in turn; the first that loads wins. Only a type
/// mismatch moves on to the next one.
fn summarize(system: &ResourceSystem, path: &str) -> miette::Result<String> {
    macro_rules! attempt {
        ($type:ty, $describe:expr) => {
            match system.load::<$type>(path) {
                Ok(value) => return Ok($describe(&*value)),
                Err(err) if err.is_not_found() && system.index().open(path).is_ok() => {},
                Err(err) => return Err(report(err)),
            }
        };
    }
    attempt!(Image, describe_image);
    attempt!(Track, describe_track);
    attempt!(Animation, describe_animation);
    attempt!(Gait, describe_gait);
    Err(miette!("{path} is not an image, track, animation or gait"))
}

fn describe_image(image: &Image) -> String {
    let channels = image.channels.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
    format!("image {}x{}, {}-bit {channels}", image.width, image.height, image.depth)
}

fn describe_track(track: &Track) -> String {
    let linked = track.faces.iter().flat_map(|face| face.neighbours).flatten().count();
    format!("track, {} faces, {linked} linked edges", track.faces.len())
}

fn describe_animation(animation: &Animation) -> String {
    let mut out = format!("animation, {}s, {} bones", animation.duration, animation.bones.len());
    for (name, bone) in &animation.bones {
        out.push_str(&format!("\n  {name}: {} frames", bone.frames.len()));
    }
    out
}

fn describe_gait(gait: &Gait) -> String {
    let mode = |name: &str, mode: &GaitMode| {
        let animation = mode.animation.as_ref().map_or("-", |proxy| proxy.path());
        format!("\n  {name}: stride {}, animation {animation}", mode.stride)
    };
    let mut out = String::from("gait");
    for (name, m) in [("run", &gait.run), ("sneak", &gait.sneak), ("turn", &gait.turn), ("walk", &gait.walk)] {
        out.push_str(&mode(name, m));
    }
    out
}
