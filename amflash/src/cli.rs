use amflash_lib::utils::Utils;
use amflash_lib::{AddressRange, Variant, sector_map};
use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::AmflashConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "AM29F400B flash programmer", long_about = None)]
pub struct Cli {
    /// JSON configuration file path
    #[arg(long = "config", short = 'f')]
    pub config: Option<String>,

    /// Serial port device (asked for interactively when not given)
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,

    /// Serial port baud rate (default: 115200)
    #[arg(short = 'b', long = "baud")]
    pub baud: Option<u32>,

    /// Delay after every chunk or sector command in milliseconds (default: 50)
    #[arg(long = "pacing-ms")]
    pub pacing_ms: Option<u64>,

    /// Do not ask for confirmation before writing or erasing
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Suppress progress bar output (default: false)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Read the flash (or part of it) into a new file
    Read(ReadCommand),

    /// Dump the whole flash into a new file
    Dump(DumpCommand),

    /// Write a file to the flash. Full and sector writes erase first,
    /// --start/--size writes do not
    Write(WriteCommand),

    /// Erase the whole flash or one sector
    Erase(EraseCommand),

    /// Print the protection state of every sector
    Protection,

    /// Print the sector layout
    Layout(LayoutCommand),
}

/// Which part of the chip a read or write covers.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Sector index, 0 to 10 (`SA` prefix allowed)
    #[arg(short = 's', long = "sector", conflicts_with_all = ["start", "size"])]
    pub sector: Option<String>,

    /// Start address (decimal, 0x hex, 0b binary or 0o octal)
    #[arg(long = "start", requires = "size")]
    pub start: Option<String>,

    /// Number of bytes
    #[arg(long = "size", requires = "start")]
    pub size: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReadCommand {
    /// Output file, must not exist yet
    pub file: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DumpCommand {
    /// Output file (default: dump-<timestamp>.bin)
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct WriteCommand {
    /// Binary image, its size must match the target
    pub file: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EraseCommand {
    /// Sector index, 0 to 10 (`SA` prefix allowed). Erases every sector when omitted
    #[arg(short = 's', long = "sector")]
    pub sector: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LayoutCommand {
    /// Chip variant; the connected chip is identified when omitted
    #[arg(long = "variant", value_enum)]
    pub variant: Option<Variant>,
}

/// A parsed [`TargetArgs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    FullChip,
    Sector(usize),
    Range(AddressRange),
}

impl TargetArgs {
    pub fn parse(&self) -> Result<Target> {
        match (&self.sector, &self.start, &self.size) {
            (None, None, None) => Ok(Target::FullChip),
            (Some(sector), None, None) => Ok(Target::Sector(Utils::parse_sector(sector)?)),
            (None, Some(start), Some(size)) => Ok(Target::Range(Utils::parse_range(start, size)?)),
            _ => bail!("Use either --sector or both --start and --size"),
        }
    }
}

impl Target {
    /// Byte range on a chip of the given variant.
    pub fn range(&self, variant: Variant) -> Result<AddressRange> {
        Ok(match *self {
            Target::FullChip => AddressRange::full_chip(),
            Target::Sector(index) => sector_map::range(variant, index)?,
            Target::Range(range) => range,
        })
    }

    /// Byte length when it does not depend on the chip variant.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            Target::FullChip => Some(AddressRange::full_chip().byte_len()),
            Target::Sector(_) => None,
            Target::Range(range) => Some(range.byte_len()),
        }
    }
}

/// Everything the commands need after merging the config file and the
/// command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: Option<String>,
    pub baud: u32,
    pub pacing: Duration,
    pub quiet: bool,
    pub yes: bool,
}

/// Merge CLI arguments with configuration file, CLI args take precedence
pub fn merge_config(args: &Cli, config: Option<AmflashConfig>) -> Result<Settings> {
    let base_config = config.unwrap_or_else(AmflashConfig::with_defaults);

    let port = args.port.clone().or(base_config.port);
    let baud = args.baud.unwrap_or(base_config.baud);
    let pacing_ms = args.pacing_ms.unwrap_or(base_config.pacing_ms);

    if baud == 0 {
        bail!("Baud rate must be greater than zero");
    }

    Ok(Settings {
        port,
        baud,
        pacing: Duration::from_millis(pacing_ms),
        quiet: args.quiet || base_config.quiet,
        yes: args.yes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use amflash_lib::Error;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("amflash").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_overrides_config() {
        let args = parse(&["--port", "COM7", "--pacing-ms", "0", "protection"]);
        let config = AmflashConfig {
            port: Some("COM3".into()),
            baud: 57_600,
            pacing_ms: 20,
            quiet: true,
        };

        let settings = merge_config(&args, Some(config)).unwrap();
        assert_eq!(settings.port.as_deref(), Some("COM7"));
        assert_eq!(settings.baud, 57_600);
        assert_eq!(settings.pacing, Duration::ZERO);
        assert!(settings.quiet);
        assert!(!settings.yes);
    }

    #[test]
    fn defaults_without_config() {
        let settings = merge_config(&parse(&["-y", "erase"]), None).unwrap();
        assert_eq!(settings.port, None);
        assert_eq!(settings.baud, 115_200);
        assert_eq!(settings.pacing, Duration::from_millis(50));
        assert!(settings.yes);
    }

    #[test]
    fn zero_baud_is_rejected() {
        assert!(merge_config(&parse(&["--baud", "0", "protection"]), None).is_err());
    }

    #[test]
    fn read_targets() {
        let Commands::Read(read) = parse(&["read", "out.bin"]).command else {
            panic!("expected read");
        };
        assert_eq!(read.target.parse().unwrap(), Target::FullChip);

        let Commands::Read(read) = parse(&["read", "out.bin", "--sector", "SA4"]).command else {
            panic!("expected read");
        };
        assert_eq!(read.target.parse().unwrap(), Target::Sector(4));

        let Commands::Read(read) =
            parse(&["read", "out.bin", "--start", "0x7C000", "--size", "16k"]).command
        else {
            panic!("expected read");
        };
        let Target::Range(range) = read.target.parse().unwrap() else {
            panic!("expected range");
        };
        assert_eq!((range.start(), range.size()), (0x7C000, 0x4000));
    }

    #[test]
    fn conflicting_targets_are_rejected_by_clap() {
        let argv = ["amflash", "write", "in.bin", "--sector", "1", "--start", "0"];
        assert!(Cli::try_parse_from(argv).is_err());
        let argv = ["amflash", "read", "in.bin", "--start", "0"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn bad_sector_is_reported() {
        let target = TargetArgs {
            sector: Some("11".into()),
            ..Default::default()
        };
        let err = target.parse().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::SectorIndexOutOfRange(11))
        ));
    }

    #[test]
    fn sector_target_depends_on_variant() {
        let target = Target::Sector(1);
        assert_eq!(target.range(Variant::TopBoot).unwrap().size(), 0x10000);
        assert_eq!(target.range(Variant::BottomBoot).unwrap().size(), 0x2000);
        assert!(Target::FullChip.range(Variant::TopBoot).unwrap().is_full_chip());

        assert_eq!(Target::FullChip.fixed_len(), Some(0x80000));
        assert_eq!(target.fixed_len(), None);
    }

    #[test]
    fn layout_variant_names() {
        let Commands::Layout(layout) = parse(&["layout", "--variant", "b"]).command else {
            panic!("expected layout");
        };
        assert_eq!(layout.variant, Some(Variant::BottomBoot));
    }
}
