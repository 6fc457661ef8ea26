use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::warn;
use rak7200::config::Settings;
use rak7200::options;
use rak7200::state::{Class, JoinMode, LoraStatus, Sensor, WorkMode};
use rak7200::monitor::log_line;
use rak7200::{RawTerminal, Result, SerialTransport, Session};
use std::fmt::Display;
use std::io::{self, Write};
use std::process::exit;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rak7200", version, about = "Configure and monitor a RAK7200 LoRa tracker")]
struct Cli {
    /// Serial port the device is attached to
    #[arg(long, env = "RAK7200_PORT")]
    port: String,

    #[arg(long, env = "RAK7200_BAUDRATE", default_value_t = rak7200::config::DEFAULT_BAUD_RATE)]
    baudrate: u32,

    /// Seconds to wait for the device to answer a command
    #[arg(long, default_value = "2", value_parser = options::parse_timeout)]
    timeout: Duration,

    /// Log serial traffic
    #[arg(long, overrides_with = "nodebug")]
    debug: bool,

    #[arg(long, overrides_with = "debug")]
    nodebug: bool,

    /// Log configuration changes
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Change LoRa, sensor and channel settings
    Config(ConfigArgs),
    /// Stream device output and send commands with single keystrokes
    Monitor {
        /// Prefix each device line with the local time
        #[arg(long)]
        timestamps: bool,
    },
    /// Restart the device
    Restart,
    /// Join the LoRaWAN network
    Join,
    /// Reboot into the bootloader
    Boot,
    /// Print what the device reports
    Show {
        #[arg(value_enum)]
        kind: ShowKind,
    },
    /// Run any command listed by the device's help, e.g. `set_config=lora:ch_mask 1 0`
    Command { name: String, args: Vec<String> },
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowKind {
    AllChannels,
    Channels,
    Commands,
    Device,
    Lora,
    Version,
}

#[derive(Clone, Copy, Debug)]
struct Interval(Option<u32>);

fn parse_interval(value: &str) -> std::result::Result<Interval, String> {
    options::parse_interval(value).map(Interval)
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, value_parser = options::parse_region)]
    region: Option<String>,
    #[arg(long, value_parser = options::parse_class)]
    class: Option<Class>,
    #[arg(long, value_parser = options::parse_join_mode)]
    join_mode: Option<JoinMode>,
    #[arg(long, value_parser = options::parse_work_mode)]
    work_mode: Option<WorkMode>,
    #[arg(long, value_parser = options::parse_eui)]
    dev_eui: Option<String>,
    #[arg(long, value_parser = options::parse_eui)]
    app_eui: Option<String>,
    #[arg(long, value_parser = options::parse_app_key)]
    app_key: Option<String>,
    /// Confirmed uplinks (on/off)
    #[arg(long, action = ArgAction::Set, value_parser = options::parse_switch)]
    confirm: Option<bool>,
    /// Adaptive data rate (on/off)
    #[arg(long, action = ArgAction::Set, value_parser = options::parse_switch)]
    adr: Option<bool>,
    /// Seconds between uplinks, or `off`
    #[arg(long, value_parser = parse_interval)]
    send_interval: Option<Interval>,
    #[arg(long, action = ArgAction::Set, value_parser = options::parse_switch)]
    accelerometer: Option<bool>,
    #[arg(long, action = ArgAction::Set, value_parser = options::parse_switch)]
    gyro: Option<bool>,
    #[arg(long, action = ArgAction::Set, value_parser = options::parse_switch)]
    voltage: Option<bool>,
    #[arg(long, action = ArgAction::Set, value_parser = options::parse_switch)]
    magnetometer: Option<bool>,
    /// Channels to disable
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    mask: Vec<u8>,
    /// Channels to enable
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    unmask: Vec<u8>,
}

fn configure(session: &mut Session<SerialTransport>, args: ConfigArgs) -> Result<()> {
    let mut changed = false;
    if let Some(mode) = args.work_mode {
        session.set_work_mode(mode)?;
        changed = true;
    }
    if let Some(region) = &args.region {
        session.set_region(region)?;
        changed = true;
    }
    if let Some(mode) = args.join_mode {
        session.set_join_mode(mode)?;
        changed = true;
    }
    if let Some(class) = args.class {
        session.set_class(class)?;
        changed = true;
    }
    if let Some(eui) = &args.dev_eui {
        session.set_dev_eui(eui)?;
        changed = true;
    }
    if let Some(eui) = &args.app_eui {
        session.set_app_eui(eui)?;
        changed = true;
    }
    if let Some(key) = &args.app_key {
        session.set_app_key(key)?;
        changed = true;
    }
    if let Some(confirm) = args.confirm {
        session.set_confirm(confirm)?;
        changed = true;
    }
    if let Some(adr) = args.adr {
        session.set_adr(adr)?;
        changed = true;
    }
    if let Some(Interval(seconds)) = args.send_interval {
        session.set_send_interval(seconds)?;
        changed = true;
    }
    let sensors = [
        (Sensor::Accelerometer, args.accelerometer),
        (Sensor::Gyro, args.gyro),
        (Sensor::Voltage, args.voltage),
        (Sensor::Magnetometer, args.magnetometer),
    ];
    for (sensor, on) in sensors {
        if let Some(on) = on {
            session.set_sensor(sensor, on)?;
            changed = true;
        }
    }
    for channel in args.mask {
        session.mask_channel(channel, true)?;
        changed = true;
    }
    for channel in args.unmask {
        session.mask_channel(channel, false)?;
        changed = true;
    }
    if !changed {
        warn!("nothing to configure");
    }
    Ok(())
}

fn field<T: Display>(name: &str, value: &Option<T>) {
    match value {
        Some(value) => println!("{:<14} {}", name, value),
        None => println!("{:<14} -", name),
    }
}

fn print_lora(status: &LoraStatus) {
    field("Work mode", &status.work_mode);
    field("Region", &status.region);
    field("Join mode", &status.join_mode);
    field("Class", &status.class);
    field("Device EUI", &status.dev_eui);
    field("App EUI", &status.app_eui);
    field("App key", &status.app_key);
    field("Confirm", &status.confirm);
    field("ADR", &status.adr);
    field("Send interval", &status.send_interval.map(|s| format!("{}s", s)));
}

fn show(session: &mut Session<SerialTransport>, kind: ShowKind) -> Result<()> {
    match kind {
        ShowKind::Version => println!("{}", session.version()?),
        ShowKind::Lora => print_lora(session.lora_status()?),
        ShowKind::Device => {
            for line in session.device_status()? {
                println!("{}", line);
            }
        }
        ShowKind::Commands => {
            for (name, arguments) in session.command_catalog()? {
                println!("{:<40} {}", name, arguments);
            }
        }
        ShowKind::Channels | ShowKind::AllChannels => {
            let all = matches!(kind, ShowKind::AllChannels);
            println!("{:>3}  {:<4} {:>9}  DR", "CH", "", "MHz");
            for channel in session.channels()?.values() {
                if !all && !channel.open {
                    continue;
                }
                println!(
                    "{:>3}{} {:<4} {:>9.1}  {}-{}",
                    channel.number,
                    if channel.initializing { '*' } else { ' ' },
                    if channel.open { "on" } else { "off" },
                    channel.frequency_mhz,
                    channel.dr_min,
                    channel.dr_max
                );
            }
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::new(cli.port)
        .baud_rate(cli.baudrate)
        .timeout(cli.timeout);
    let retry = settings.channel_retry;
    let mut session = Session::new(SerialTransport::new(settings)).with_channel_retry(retry);

    match cli.command {
        Commands::Config(args) => configure(&mut session, args),
        Commands::Monitor { timestamps } => {
            let terminal = RawTerminal::enter()?;
            session.monitor(terminal, io::stdout(), timestamps)
        }
        Commands::Restart => session.restart(),
        Commands::Join => {
            for line in session.join()? {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Boot => session.boot(),
        Commands::Show { kind } => show(&mut session, kind),
        Commands::Command { name, args } => {
            for line in session.run(&name, &args)? {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.debug && !cli.nodebug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format(|buf, record| buf.write_all(log_line(record).as_bytes()))
        .init();

    if let Err(err) = run(cli) {
        eprintln!("error: {}", err);
        exit(if err.is_transport() { 2 } else { 1 });
    }
}
