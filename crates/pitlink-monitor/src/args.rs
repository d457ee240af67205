//! Command-line parsing

use anyhow::{anyhow, bail, Context, Result};
use pitlink_core::prelude::{Command, Mode, TemperatureUnit};
use std::path::PathBuf;

pub const USAGE: &str = "\
usage: pitlink-monitor [options] [command]

options:
  --demo            talk to the built-in simulated smoker
  --port PATH       serial port of the bonded controller
  --tcp HOST:PORT   serial-over-TCP bridge
  --config PATH     link config file
  --celsius         setpoints and readings in Celsius (default Fahrenheit)

commands:
  chamber TEMP | cook TEMP | fan PERCENT | damper open|closed
  mode auto|manual | fuel";

#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub demo: bool,
    pub port: Option<String>,
    pub tcp: Option<String>,
    pub config: Option<PathBuf>,
    pub unit: TemperatureUnit,
    pub command: Option<Command>,
    pub help: bool,
}

pub fn parse<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut rest = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--demo" => parsed.demo = true,
            "--celsius" => parsed.unit = TemperatureUnit::Celsius,
            "--fahrenheit" => parsed.unit = TemperatureUnit::Fahrenheit,
            "--port" => parsed.port = Some(value(&mut iter, "--port")?),
            "--tcp" => parsed.tcp = Some(value(&mut iter, "--tcp")?),
            "--config" => parsed.config = Some(value(&mut iter, "--config")?.into()),
            "-h" | "--help" => parsed.help = true,
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => rest.push(arg),
        }
    }

    if !rest.is_empty() {
        parsed.command = Some(parse_command(&rest)?);
    }
    Ok(parsed)
}

fn value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    iter.next().ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn parse_command(words: &[String]) -> Result<Command> {
    let arg = words.get(1).map(String::as_str);
    let command = match (words[0].as_str(), arg) {
        ("chamber", Some(v)) => Command::SetChamberTarget(v.parse().context("chamber target")?),
        ("cook", Some(v)) => Command::SetCookTarget(v.parse().context("cook target")?),
        ("fan", Some(v)) => Command::SetFanDuty(v.parse().context("fan duty")?),
        ("damper", Some("open")) => Command::SetDamper(true),
        ("damper", Some("closed" | "close")) => Command::SetDamper(false),
        ("mode", Some("auto")) => Command::SetMode(Mode::Auto),
        ("mode", Some("manual")) => Command::SetMode(Mode::Manual),
        ("fuel", None) => Command::DispenseFuel,
        _ => bail!("unrecognised command: {}", words.join(" ")),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(line: &str) -> Result<Args> {
        parse(line.split_whitespace().map(str::to_string))
    }

    #[test]
    fn parses_options_and_command() {
        let parsed = args("--demo --celsius chamber 110").unwrap();
        assert_eq!(
            parsed,
            Args {
                demo: true,
                unit: TemperatureUnit::Celsius,
                command: Some(Command::SetChamberTarget(110)),
                ..Args::default()
            }
        );
    }

    #[test]
    fn parses_actuator_commands() {
        assert_eq!(args("damper open").unwrap().command, Some(Command::SetDamper(true)));
        assert_eq!(args("fuel").unwrap().command, Some(Command::DispenseFuel));
        assert_eq!(
            args("--port /dev/rfcomm0 mode manual").unwrap().command,
            Some(Command::SetMode(Mode::Manual))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(args("chamber hot").is_err());
        assert!(args("--port").is_err());
        assert!(args("--verbose").is_err());
        assert!(args("fan").is_err());
    }
}
