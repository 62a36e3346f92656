//! ofxrs CLI - drive image effects from the command line.
//!
//! Lists and describes the built-in effects plus any found in a plugin
//! directory, and renders one frame of an effect to a PNG.

use anyhow::{anyhow, bail, Context as _, Result};
use log::{debug, info};
use ofxrs::host::clip::image_from_view;
use ofxrs::prelude::*;
use std::path::{Path, PathBuf};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        return;
    }

    let result = match args[1].as_str() {
        "list" => Options::parse(&args[2..]).and_then(|opts| list_effects(&opts)),
        "describe" => match args.get(2) {
            Some(id) => Options::parse(&args[3..]).and_then(|opts| describe_effect(id, &opts)),
            None => Err(anyhow!("please specify an effect identifier")),
        },
        "render" => match args.get(2) {
            Some(id) => Options::parse(&args[3..]).and_then(|opts| render_effect(id, &opts)),
            None => Err(anyhow!("please specify an effect identifier")),
        },
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(())
        }
        other => {
            print_usage(&args[0]);
            Err(anyhow!("unknown command: {}", other))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("ofxrs v{}", ofxrs::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list                List available effects");
    println!("  describe <id>       Show contexts, clips and parameters of an effect");
    println!("  render <id>         Render one frame");
    println!("  help                Show this help message");
    println!();
    println!("Options:");
    println!("  --config <file>         Host configuration (TOML)");
    println!("  --plugins <dir>         Also load bundles found under a directory");
    println!();
    println!("Render options:");
    println!("  --input <image>         Source image; without one the effect runs as a generator");
    println!("  --output <png>          Where to write the result (default: output.png)");
    println!("  --depth <byte|short|float>  Force the processing depth");
    println!("  --workers <n>           Render threads, 0 for one per CPU");
    println!("  --param <name=value>    Set a parameter, may be repeated");
    println!("  --time <t>              Frame to render (default: 0)");
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    plugins: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    depth: Option<BitDepth>,
    workers: Option<usize>,
    params: Vec<(String, String)>,
    time: f64,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self> {
        let mut opts = Options::default();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let mut value = || iter.next().ok_or_else(|| anyhow!("{} needs a value", flag));
            match flag.as_str() {
                "--config" => opts.config = Some(PathBuf::from(value()?)),
                "--plugins" => opts.plugins = Some(PathBuf::from(value()?)),
                "--input" => opts.input = Some(PathBuf::from(value()?)),
                "--output" => opts.output = Some(PathBuf::from(value()?)),
                "--depth" => opts.depth = Some(parse_depth(value()?)?),
                "--workers" => opts.workers = Some(value()?.parse().context("--workers")?),
                "--time" => opts.time = value()?.parse().context("--time")?,
                "--param" => {
                    let pair = value()?;
                    let (name, text) = pair
                        .split_once('=')
                        .ok_or_else(|| anyhow!("expected name=value, got '{}'", pair))?;
                    opts.params.push((name.to_string(), text.to_string()));
                }
                other => bail!("unknown option: {}", other),
            }
        }
        Ok(opts)
    }
}

fn parse_depth(text: &str) -> Result<BitDepth> {
    match text.to_lowercase().as_str() {
        "byte" | "8" => Ok(BitDepth::Byte),
        "short" | "16" => Ok(BitDepth::Short),
        "float" | "32" => Ok(BitDepth::Float),
        other => bail!("unknown depth: {}", other),
    }
}

/// Parse `text` as a value of the same kind as `current`.
fn parse_value(current: &ParamValue, text: &str) -> Result<ParamValue> {
    let numbers = || -> Result<Vec<f64>> {
        text.split(',')
            .map(|part| part.trim().parse::<f64>().with_context(|| format!("bad number '{}'", part)))
            .collect()
    };
    let value = match current {
        ParamValue::Double(_) => ParamValue::Double(text.parse()?),
        ParamValue::Integer(_) => ParamValue::Integer(text.parse()?),
        ParamValue::Choice(_) => ParamValue::Choice(text.parse()?),
        ParamValue::Boolean(_) => ParamValue::Boolean(matches!(text, "1" | "true" | "yes" | "on")),
        ParamValue::String(_) => ParamValue::String(text.to_string()),
        ParamValue::Double2D(..) => match numbers()?.as_slice() {
            [x, y] => ParamValue::Double2D(*x, *y),
            _ => bail!("expected x,y"),
        },
        ParamValue::Rgba(_) => match numbers()?.as_slice() {
            [r, g, b, a] => ParamValue::Rgba([*r, *g, *b, *a]),
            [r, g, b] => ParamValue::Rgba([*r, *g, *b, 1.0]),
            _ => bail!("expected r,g,b[,a]"),
        },
        ParamValue::None => bail!("parameter holds no value"),
    };
    Ok(value)
}

// ============================================================================
// Host setup
// ============================================================================

fn build_host(opts: &Options) -> Result<EffectHost> {
    let mut config = match &opts.config {
        Some(path) => HostConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => HostConfig::default(),
    };
    if let Some(workers) = opts.workers {
        config.max_workers = workers;
    }
    if let Some(depth) = opts.depth {
        config.supported_depths = vec![depth];
    }

    let mut host = EffectHost::new(config)?;
    let builtins = host.add_bundle(&builtin_bundle());
    debug!("{} built-in effect(s)", builtins);
    if let Some(dir) = &opts.plugins {
        load_plugins(&mut host, dir);
    }
    Ok(host)
}

fn load_plugins(host: &mut EffectHost, dir: &Path) {
    // SAFETY: the user pointed us at this directory; its libraries are
    // trusted to be bundles built against this crate.
    let accepted = unsafe { host.load_directory(dir) };
    info!("Loaded {} effect(s) from {}", accepted, dir.display());
}

// ============================================================================
// Commands
// ============================================================================

fn list_effects(opts: &Options) -> Result<()> {
    let host = build_host(opts)?;
    let plugins: Vec<_> = host.plugins().collect();
    println!("Available effects ({} total):", plugins.len());
    println!();
    for info in plugins {
        let contexts: Vec<String> = info
            .capabilities
            .supported_contexts
            .iter()
            .map(|c| format!("{:?}", c))
            .collect();
        println!("  {} v{}  {}", info.entry.identifier, info.entry.version, info.label);
        println!("      {} [{}]", info.description, contexts.join(", "));
    }
    if !host.excluded().is_empty() {
        println!();
        println!("Excluded:");
        for excluded in host.excluded() {
            println!("  {} v{}: {}", excluded.entry.identifier, excluded.entry.version, excluded.reason);
        }
    }
    Ok(())
}

fn describe_effect(id: &str, opts: &Options) -> Result<()> {
    let host = build_host(opts)?;
    let info = host.plugin(id)?;
    let caps = &info.capabilities;

    println!("Effect: {}", info.label);
    println!("ID: {}", info.entry.identifier);
    println!("Version: {}", info.entry.version);
    if !info.grouping.is_empty() {
        println!("Grouping: {}", info.grouping);
    }
    println!();
    println!("Description:");
    println!("  {}", info.description);
    println!();
    println!("Depths: {:?}", caps.supported_depths);
    println!("Thread safety: {:?}", caps.render_thread_safety);
    println!("Tiles: {}  Multi-resolution: {}", caps.supports_tiles, caps.supports_multi_resolution);

    for context in &caps.supported_contexts {
        let (clips, params) = host.describe_context(id, *context)?;
        println!();
        println!("Context {:?}:", context);
        println!("  Clips: {}", clips.join(", "));
        if !params.is_empty() {
            println!("  Parameters: {}", params.join(", "));
        }
    }
    Ok(())
}

fn render_effect(id: &str, opts: &Options) -> Result<()> {
    let host = build_host(opts)?;
    let info = host.plugin(id)?;
    let contexts = &info.capabilities.supported_contexts;

    let mut inputs: IndexMap<String, Arc<dyn FrameSource>> = IndexMap::new();
    let context = match &opts.input {
        Some(path) => {
            let image = image::open(path).with_context(|| format!("reading {}", path.display()))?;
            inputs.insert(SOURCE_CLIP.to_string(), Arc::new(StillSource::from_image(&image)?));
            [Context::Filter, Context::General]
                .into_iter()
                .find(|c| contexts.contains(c))
                .ok_or_else(|| anyhow!("{} does not take an input", id))?
        }
        None => [Context::Generator, Context::General]
            .into_iter()
            .find(|c| contexts.contains(c))
            .ok_or_else(|| anyhow!("{} needs an --input", id))?,
    };

    let instance = host.create_instance(id, context, inputs)?;
    for (name, text) in &opts.params {
        let current = instance.param_value(name, opts.time)?;
        let value = parse_value(&current, text).with_context(|| format!("parameter {}", name))?;
        instance.set_param(name, value)?;
    }

    let frame = instance.render(opts.time, None)?;
    let image = image_from_view(&frame.view()?)?;
    let image = match image {
        image::DynamicImage::ImageRgba32F(_) => image::DynamicImage::ImageRgba16(image.to_rgba16()),
        other => other,
    };
    let output = opts.output.clone().unwrap_or_else(|| PathBuf::from("output.png"));
    image
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    instance.destroy()?;

    info!("Rendered {} at {} to {}", id, opts.time, output.display());
    Ok(())
}
