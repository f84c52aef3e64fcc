use clap::{Args, Parser, Subcommand};
use elster_common::{codec::CodecError, ElsterType};
use std::{path::PathBuf, str::FromStr};

#[derive(Debug, Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode the bytes of a value field
    Decode(DecodeArgs),
    /// Encode a value into the bytes of a value field
    Encode(EncodeArgs),
    /// Poll the values listed in a bus config file, and log every reading
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// The elster type, e.g. 'DEC' or 'INV_DOUBLE'
    pub elster_type: ElsterType,
    /// The bytes of the field, in decimal or with a 0x prefix
    #[arg(required = true, value_parser = clap_num::maybe_hex::<u8>)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// The elster type, e.g. 'DEC' or 'INV_DOUBLE'
    pub elster_type: ElsterType,
    #[arg(allow_negative_numbers = true)]
    pub value: f64,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a bus config TOML file
    #[arg(value_hint=clap::ValueHint::FilePath)]
    pub config: PathBuf,
    /// The CAN socket to connect to (e.g. 'can0' or 'vcan0')
    pub socket: String,
    /// Write a value on startup, e.g. --set "Comfort temperature=21.5"
    #[arg(long = "set")]
    pub set: Vec<Assignment>,
    /// Time between two engine ticks in milliseconds
    #[arg(long, default_value_t = 10)]
    pub tick_ms: u64,
}

/// A `NAME=VALUE` pair given on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: f64,
}

impl FromStr for Assignment {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, value)) = s.rsplit_once('=') else {
            return Err("Expected NAME=VALUE".into());
        };
        let name = name.trim();
        if name.is_empty() {
            return Err("Missing name".into());
        }
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("Invalid value '{value}': {e}"))?;
        Ok(Self {
            name: name.to_owned(),
            value,
        })
    }
}

/// Decode a field and format the value with the decimals of its type
pub fn describe_decode(elster_type: ElsterType, bytes: &[u8]) -> Result<String, CodecError> {
    let value = elster_type.decode(bytes)?;
    Ok(format!(
        "{value:.prec$}",
        prec = elster_type.decimals() as usize
    ))
}

/// Encode a value and format the field bytes as hex
pub fn describe_encode(elster_type: ElsterType, value: f64) -> Result<String, CodecError> {
    let field = elster_type.encode(value)?;
    let bytes: Vec<String> = field.iter().map(|b| format!("{b:02x}")).collect();
    Ok(bytes.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decode() {
        let cli = Cli::try_parse_from(["elster-cli", "decode", "dec", "0x01", "44"]).unwrap();
        let Commands::Decode(args) = cli.command else {
            panic!("Wrong command {:?}", cli.command);
        };
        assert_eq!(ElsterType::Dec, args.elster_type);
        assert_eq!(vec![0x01, 44], args.bytes);

        assert!(Cli::try_parse_from(["elster-cli", "decode", "dec"]).is_err());
        assert!(Cli::try_parse_from(["elster-cli", "decode", "bogus", "1"]).is_err());
    }

    #[test]
    fn test_parse_encode_negative() {
        let cli = Cli::try_parse_from(["elster-cli", "encode", "inv double", "-2.5"]).unwrap();
        let Commands::Encode(args) = cli.command else {
            panic!("Wrong command {:?}", cli.command);
        };
        assert_eq!(ElsterType::InvDouble, args.elster_type);
        assert_eq!(-2.5, args.value);
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "elster-cli",
            "run",
            "heatpump.toml",
            "can0",
            "--set",
            "Comfort temperature=21.5",
            "--set",
            "Eco=18",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("Wrong command {:?}", cli.command);
        };
        assert_eq!("can0", args.socket);
        assert_eq!(10, args.tick_ms);
        assert_eq!(
            vec![
                Assignment {
                    name: "Comfort temperature".into(),
                    value: 21.5
                },
                Assignment {
                    name: "Eco".into(),
                    value: 18.0
                }
            ],
            args.set
        );
    }

    #[test]
    fn test_invalid_assignment() {
        assert!("21.5".parse::<Assignment>().is_err());
        assert!("=21.5".parse::<Assignment>().is_err());
        assert!("Eco=warm".parse::<Assignment>().is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!("32.4", describe_decode(ElsterType::Dec, &[0x01, 0x44]).unwrap());
        assert_eq!("-0.5", describe_decode(ElsterType::Dec, &[0xFF, 0xFB]).unwrap());
        assert_eq!("01 44", describe_encode(ElsterType::Dec, 32.4).unwrap());
        assert!(describe_decode(ElsterType::Dec, &[0x01]).is_err());
    }
}
