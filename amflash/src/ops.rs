use amflash_lib::utils::Utils;
use amflash_lib::{
    EraseTarget, Error, ErasureReport, FlashSession, Transport, Variant, sector_map,
};
use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cli::{Commands, Settings, Target};

/// Ask a yes/no question; only `y` or `yes` count as yes.
fn confirm_with<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{} Confirm [y/N]: ", question)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn confirm(question: &str, settings: &Settings) -> Result<bool> {
    if settings.yes {
        return Ok(true);
    }
    let stdin = io::stdin();
    confirm_with(question, &mut stdin.lock(), &mut io::stdout())
}

fn protection_warning(report: &ErasureReport) -> Option<String> {
    if !report.any_protected {
        return None;
    }
    let sectors: Vec<String> = report
        .protected_sectors
        .iter()
        .map(|index| format!("SA{}", index))
        .collect();
    Some(format!(
        "Warning: some sectors are protected and cannot be modified ({}).\n\
         Check protection states with the 'protection' command.",
        sectors.join(", ")
    ))
}

fn report_erasure(report: &ErasureReport) {
    tracing::info!("erase issued for {} sector(s)", report.erased);
    if let Some(warning) = protection_warning(report) {
        println!("\n{}", warning);
    }
}

/// Default name for `dump`.
fn dump_file_name() -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    PathBuf::from(format!("dump-{}.bin", timestamp))
}

fn ensure_new_file(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("File '{}' already exists", path.display());
    }
    Ok(())
}

/// Store `data` at `path` without ever replacing an existing file or leaving
/// a partial one behind.
fn save_new_file(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::Builder::new()
        .prefix(".amflash-")
        .suffix(".bin")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in '{}'", dir.display()))?;
    temp_file
        .write_all(data)
        .context("Failed to write dump into temp file")?;
    temp_file
        .persist_noclobber(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to save '{}'", path.display()))?;
    Ok(())
}

fn print_checksum(data: &[u8]) {
    println!("CRC-32: 0x{:08X} ({} bytes)", Utils::crc32(data), data.len());
}

/// A command with its arguments parsed and its files checked, so that these
/// errors show up before the port is opened.
#[derive(Debug)]
pub enum Action {
    /// Also used for `dump`, with the full chip as target.
    Read { path: PathBuf, target: Target },
    Write {
        path: PathBuf,
        image: Vec<u8>,
        target: Target,
    },
    Erase { sector: Option<usize> },
    Protection,
    Layout { variant: Option<Variant> },
}

impl Action {
    pub fn from_command(command: &Commands) -> Result<Self> {
        Ok(match command {
            Commands::Read(params) => {
                let target = params.target.parse()?;
                ensure_new_file(&params.file)?;
                Action::Read {
                    path: params.file.clone(),
                    target,
                }
            }
            Commands::Dump(params) => {
                let path = params.file.clone().unwrap_or_else(dump_file_name);
                ensure_new_file(&path)?;
                Action::Read {
                    path,
                    target: Target::FullChip,
                }
            }
            Commands::Write(params) => {
                let target = params.target.parse()?;
                let image = std::fs::read(&params.file)
                    .with_context(|| format!("Failed to read '{}'", params.file.display()))?;
                if let Some(expected) = target.fixed_len() {
                    check_image_len(&params.file, &image, expected)?;
                }
                Action::Write {
                    path: params.file.clone(),
                    image,
                    target,
                }
            }
            Commands::Erase(params) => Action::Erase {
                sector: params
                    .sector
                    .as_deref()
                    .map(Utils::parse_sector)
                    .transpose()?,
            },
            Commands::Protection => Action::Protection,
            Commands::Layout(params) => Action::Layout {
                variant: params.variant,
            },
        })
    }
}

fn check_image_len(path: &Path, image: &[u8], expected: usize) -> Result<()> {
    if image.len() != expected {
        bail!(
            "File size must be {} bytes, '{}' has {}",
            expected,
            path.display(),
            image.len()
        );
    }
    Ok(())
}

/// Run `action` against a connected chip.
pub fn execute<T: Transport>(
    session: &mut FlashSession<T>,
    settings: &Settings,
    action: Action,
) -> Result<()> {
    match action {
        Action::Read { path, target } => execute_read(session, &path, target),
        Action::Write {
            path,
            image,
            target,
        } => execute_write(session, settings, &path, &image, target),
        Action::Erase { sector } => execute_erase(session, settings, sector),
        Action::Protection => execute_protection(session),
        Action::Layout { variant } => {
            print_layout(variant.unwrap_or_else(|| session.variant()));
            Ok(())
        }
    }
}

fn execute_read<T: Transport>(
    session: &mut FlashSession<T>,
    path: &Path,
    target: Target,
) -> Result<()> {
    let range = target.range(session.variant())?;
    let mut data = Vec::with_capacity(range.byte_len());
    let result = match target {
        Target::FullChip => session.read_full(&mut data),
        _ => session.read(range, &mut data),
    };
    if let Err(Error::SuspiciousEmptyRead) = result {
        bail!("Every byte read was 0x00; the chip is probably not connected. Nothing saved");
    }
    result.context("Failed to read flash")?;

    save_new_file(path, &data)?;
    println!("Saved to {}", path.display());
    print_checksum(&data);
    Ok(())
}

/// Full and sector writes erase their target first, range writes program
/// over whatever is there.
fn execute_write<T: Transport>(
    session: &mut FlashSession<T>,
    settings: &Settings,
    path: &Path,
    image: &[u8],
    target: Target,
) -> Result<()> {
    let range = target.range(session.variant())?;
    check_image_len(path, image, range.byte_len())?;

    let question = format!(
        "The contents of '{}' are about to be written to the flash.",
        path.display()
    );
    if !confirm(&question, settings)? {
        println!("Aborted");
        return Ok(());
    }

    let erase_target = match target {
        Target::FullChip => Some(EraseTarget::AllSectors),
        Target::Sector(index) => Some(EraseTarget::Sector(index)),
        Target::Range(_) => None,
    };
    let report = match erase_target {
        Some(erase_target) => Some(session.erase(erase_target).context("Failed to erase flash")?),
        None => None,
    };

    session.write(range, image).context("Failed to write flash")?;
    print_checksum(image);
    if let Some(report) = report {
        report_erasure(&report);
    }
    Ok(())
}

fn execute_erase<T: Transport>(
    session: &mut FlashSession<T>,
    settings: &Settings,
    sector: Option<usize>,
) -> Result<()> {
    let (target, question) = match sector {
        Some(index) => (
            EraseTarget::Sector(index),
            format!("Sector SA{} is about to be erased.", index),
        ),
        None => (
            EraseTarget::AllSectors,
            "The contents of the flash are about to be erased.".to_string(),
        ),
    };
    if !confirm(&question, settings)? {
        println!("Aborted");
        return Ok(());
    }

    let report = session.erase(target).context("Failed to erase flash")?;
    report_erasure(&report);
    Ok(())
}

fn execute_protection<T: Transport>(session: &mut FlashSession<T>) -> Result<()> {
    let states = session
        .protection_report()
        .context("Failed to query sector protection")?;

    println!("Sector protection states:");
    for state in states {
        let label = if state.protected { "Protected" } else { "Unprotected" };
        println!("SA{}: {}", state.index, label);
    }
    Ok(())
}

fn layout_lines(variant: Variant) -> Vec<String> {
    let mut lines = vec![format!("{} (device ID 0x{:02X})", variant, variant.device_id())];
    lines.extend(sector_map::all_sectors(variant).enumerate().map(|(index, range)| {
        format!(
            "SA{:<2}  0x{:05X}-0x{:05X}  {:>3} KiB",
            index,
            range.start(),
            range.end() - 1,
            range.size() / 1024
        )
    }));
    lines
}

pub fn print_layout(variant: Variant) {
    for line in layout_lines(variant) {
        println!("{}", line);
    }
}
