use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::config::Config;
use crate::devices::{ClimateCall, ClimateFanMode, NilanCommand};
use crate::modbus::list_serial_ports;
use crate::services::PollService;

pub fn build_cli() -> Command {
    Command::new("nilan")
        .version(crate::VERSION)
        .about("Modbus RTU polling client for Nilan ventilation controllers")
        .arg(global("config", 'c', "Configuration file (TOML)"))
        .arg(global("port", 'p', "Serial port, e.g. /dev/ttyUSB0"))
        .arg(global("baud", 'b', "Baud rate"))
        .arg(
            Arg::new("parity")
                .long("parity")
                .help("Parity: none, even or odd")
                .global(true),
        )
        .arg(global("slave", 's', "Modbus slave address of the controller"))
        .arg(global("interval", 'i', "Seconds between poll cycles"))
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .help("Output format")
                .value_parser(["console", "json", "csv"])
                .global(true),
        )
        .arg(global("output-file", 'o', "Append readings to this file"))
        .arg(
            Arg::new("blocks")
                .long("blocks")
                .help("Comma separated register blocks to poll, e.g. control_input,fan_data")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("run").about("Poll continuously and accept console commands"))
        .subcommand(Command::new("once").about("Run one poll cycle and print every reading"))
        .subcommand(
            Command::new("get")
                .about("Run one poll cycle and print a single reading")
                .arg(Arg::new("name").required(true).help("Reading name, e.g. target_temp")),
        )
        .subcommand(
            Command::new("set-temp")
                .about("Write the target temperature")
                .arg(Arg::new("celsius").required(true).allow_negative_numbers(true)),
        )
        .subcommand(
            Command::new("set-fan")
                .about("Write the ventilation step")
                .arg(Arg::new("speed").required(true)),
        )
        .subcommand(
            Command::new("fan")
                .about("Set the fan mode")
                .arg(
                    Arg::new("mode")
                        .required(true)
                        .value_parser(["off", "low", "medium", "high"]),
                ),
        )
        .subcommand(
            Command::new("set-mode")
                .about("Write the operation mode (0 off, 1 heat, 2 cool, 3 auto, 4 service)")
                .arg(Arg::new("mode").required(true)),
        )
        .subcommand(
            Command::new("runset")
                .about("Start (1) or stop (0) the unit")
                .arg(Arg::new("value").required(true)),
        )
        .subcommand(
            Command::new("write-register")
                .about("Write a raw holding register")
                .arg(Arg::new("register").required(true))
                .arg(Arg::new("value").required(true))
                .arg(
                    Arg::new("ignore-response")
                        .long("ignore-response")
                        .help("Do not wait for the controller to answer")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list-ports").about("List available serial ports"))
        .subcommand(
            Command::new("init-config")
                .about("Write a configuration template")
                .arg(Arg::new("path").default_value("nilan.toml")),
        )
}

fn global(name: &'static str, short: char, help: &'static str) -> Arg {
    Arg::new(name).short(short).long(name).help(help).global(true)
}

fn value<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| anyhow!("Missing argument: {}", name))
}

fn parse<T>(matches: &ArgMatches, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = value(matches, name)?;
    raw.parse()
        .with_context(|| format!("Invalid {}: {}", name, raw))
}

/// Write command a one-shot subcommand stands for, if any.
pub fn command_from_subcommand(name: &str, sub: &ArgMatches) -> Result<Option<NilanCommand>> {
    let command = match name {
        "set-temp" => NilanCommand::TargetTemperature(parse(sub, "celsius")?),
        "set-fan" => NilanCommand::FanSpeed(parse(sub, "speed")?),
        "set-mode" => NilanCommand::OperationMode(parse(sub, "mode")?),
        "runset" => NilanCommand::Runset(parse(sub, "value")?),
        "write-register" => NilanCommand::WriteRegister {
            register: parse(sub, "register")?,
            value: parse(sub, "value")?,
            ignore_response: sub.get_flag("ignore-response"),
        },
        _ => return Ok(None),
    };
    Ok(Some(command))
}

/// One line typed while `run` is active, e.g. `temp 21.5` or `fan 3`.
pub fn parse_console_command(line: &str) -> Result<NilanCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or_else(|| anyhow!("Empty command"))?;
    let mut arg = |what: &str| -> Result<String> {
        parts
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("{} needs a {}", verb, what))
    };

    let command = match verb {
        "temp" => NilanCommand::TargetTemperature(arg("temperature")?.parse()?),
        "fan" => NilanCommand::FanSpeed(arg("speed")?.parse()?),
        "mode" => NilanCommand::OperationMode(arg("mode")?.parse()?),
        "run" => NilanCommand::Runset(arg("value")?.parse()?),
        "write" | "write-nr" => NilanCommand::WriteRegister {
            register: arg("register")?.parse()?,
            value: arg("value")?.parse()?,
            ignore_response: verb == "write-nr",
        },
        other => return Err(anyhow!("Unknown command: {}", other)),
    };
    Ok(command)
}

fn spawn_console_commands(tx: UnboundedSender<NilanCommand>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match parse_console_command(&line) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("⚠️  {} (try: temp 21.5 | fan 3 | mode 1 | run 1 | write 1004 2150 | write-nr 1004 2150)", e)
                }
            }
        }
    });
}

pub async fn handle_subcommands(matches: &ArgMatches) -> Result<()> {
    let (name, sub) = matches.subcommand().unwrap_or(("run", matches));

    if name == "list-ports" {
        list_serial_ports()?;
        return Ok(());
    }

    let config = Config::from_matches(matches)?;

    if name == "init-config" {
        let path = value(sub, "path")?;
        config.save_to_file(path)?;
        println!("✅ Configuration template written to {}", path);
        return Ok(());
    }

    let mut service = PollService::open(config)?;

    if name == "run" {
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_console_commands(tx);
        service.run(rx).await?;
        return Ok(());
    }

    service.log_config();
    service.clear_senders();

    match name {
        "once" => {
            service.run_cycle(None).await?;
            println!("{}", service.formatter().format_snapshot(&service.cache().snapshot()));
        }
        "get" => {
            let reading = value(sub, "name")?;
            service.run_cycle(None).await?;
            match service.cache().get(reading) {
                Some(v) => println!("📈 {}: {}", reading, v),
                None => println!("❌ No reading named {}", reading),
            }
        }
        "fan" => {
            let mode: ClimateFanMode = value(sub, "mode")?.parse()?;
            let call = ClimateCall {
                fan_mode: Some(mode),
                ..Default::default()
            };
            service.run_climate_call(call).await?;
            println!("✅ Fan mode set to {}", mode);
        }
        _ => {
            let command = command_from_subcommand(name, sub)?
                .ok_or_else(|| anyhow!("Unknown command: {}", name))?;
            info!("🎛️  {}", command);
            service.run_cycle(Some(command)).await?;
            println!("✅ Sent {}", command);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_subcommands_map_to_commands() {
        let matches = build_cli().get_matches_from(["nilan", "set-temp", "21.5"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(
            command_from_subcommand(name, sub).unwrap(),
            Some(NilanCommand::TargetTemperature(21.5))
        );

        let matches = build_cli().get_matches_from(["nilan", "write-register", "1100", "7", "--ignore-response"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(
            command_from_subcommand(name, sub).unwrap(),
            Some(NilanCommand::WriteRegister { register: 1100, value: 7, ignore_response: true })
        );

        let matches = build_cli().get_matches_from(["nilan", "once"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(command_from_subcommand(name, sub).unwrap(), None);
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let matches = build_cli().get_matches_from(["nilan", "runset", "1", "--slave", "7", "-v"]);
        assert!(matches.get_flag("verbose"));
        let config = Config::from_matches(&matches).unwrap();
        assert_eq!(config.slave_address, 7);
    }

    #[test]
    fn test_bad_subcommand_values() {
        let matches = build_cli().get_matches_from(["nilan", "set-fan", "fast"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert!(command_from_subcommand(name, sub).is_err());
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(parse_console_command("temp 21.5").unwrap(), NilanCommand::TargetTemperature(21.5));
        assert_eq!(parse_console_command(" fan 3 ").unwrap(), NilanCommand::FanSpeed(3));
        assert_eq!(parse_console_command("mode 1").unwrap(), NilanCommand::OperationMode(1));
        assert_eq!(parse_console_command("run 0").unwrap(), NilanCommand::Runset(0));
        assert_eq!(
            parse_console_command("write-nr 1100 2").unwrap(),
            NilanCommand::WriteRegister { register: 1100, value: 2, ignore_response: true }
        );
        assert!(parse_console_command("fan").is_err());
        assert!(parse_console_command("boost 3").is_err());
        assert!(parse_console_command("write 1004 hot").is_err());
    }
}
