use std::env;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use tcconfig::Config;
use tccontrol::cast::discovery::discover_chromecasts;
use tccontrol::{DeviceTarget, Layout, TwitchCastConfigExt, TwitchCastController};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, PartialEq)]
struct Args {
    config_dir: String,
    device: Option<String>,
    host: Option<String>,
    list: bool,
    channel: String,
    layout: Option<String>,
}

fn print_usage(program: &str) {
    eprintln!(
        "Usage: {} [--config <dir>] [--device <name> | --host <addr>] <channel> [layout]",
        program
    );
    eprintln!("       {} [--config <dir>] --list", program);
    eprintln!();
    eprintln!("Layouts: right (default), left, top, bottom");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TWITCHCAST_CONFIG             Configuration directory");
    eprintln!("  TWITCHCAST_CONFIG__A__B=val   Overrides configuration key a.b");
    eprintln!("  RUST_LOG                      tracing filter (ex: tccontrol=debug)");
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "--device" | "--host" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("{} needs a value", arg))?;
                match arg.as_str() {
                    "--config" => parsed.config_dir = value,
                    "--device" => parsed.device = Some(value),
                    _ => parsed.host = Some(value),
                }
            }
            "--list" => parsed.list = true,
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    if parsed.list {
        if let Some(extra) = positional.next() {
            bail!("unexpected argument {}", extra);
        }
        return Ok(parsed);
    }
    parsed.channel = positional.next().context("missing channel")?;
    parsed.layout = positional.next();
    if let Some(extra) = positional.next() {
        bail!("unexpected argument {}", extra);
    }
    Ok(parsed)
}

fn init_tracing(default_level: &str) {
    let _ = tracing_log::LogTracer::init();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .finish();
    // LogTracer is already installed, so skip `try_init` and its own bridge
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Command line device, else the configured one.
fn resolve_target(args: &Args, config: &Config) -> Option<DeviceTarget> {
    if let Some(host) = &args.host {
        return Some(DeviceTarget::Host {
            host: host.clone(),
            port: config.get_cast_port(),
        });
    }
    if let Some(name) = &args.device {
        return Some(DeviceTarget::Name(name.clone()));
    }
    config.device_target()
}

fn run(args: Args) -> Result<()> {
    let config = Config::load_config(&args.config_dir)?;
    init_tracing(&config.get_log_min_level());

    let controller_config = config.controller_config();
    if args.list {
        return list_devices(&controller_config);
    }

    let layout = match &args.layout {
        Some(layout) => layout.parse::<Layout>()?,
        None => controller_config.default_layout,
    };
    let target = resolve_target(&args, &config)
        .ok_or(tccontrol::TwitchCastError::NoDeviceConfigured)?;

    info!("TwitchCast {} targeting {}", env!("CARGO_PKG_VERSION"), target);
    let controller = TwitchCastController::new(target, controller_config);
    controller.setup();
    controller.stream_channel(&args.channel, layout);
    Ok(())
}

fn list_devices(controller_config: &tccontrol::ControllerConfig) -> Result<()> {
    info!(
        "Looking for Chromecasts for {:?}",
        controller_config.discovery_timeout
    );
    let devices = discover_chromecasts(controller_config.discovery_timeout)?;
    if devices.is_empty() {
        println!("No Chromecast found");
    }
    for device in devices {
        println!(
            "{}\t{}:{}\t{}",
            device.friendly_name,
            device.host,
            device.port,
            device.model.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "TwitchCast".to_string());

    let args = match parse_args(argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(&program);
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
