//! Command line parsing and command execution for lfsbd.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use clap::{Args, Parser, Subcommand};
use embedded_io_adapters::tokio_1::FromTokio;
use lfs_blockdev::{
    Geometry, LfsBlockDevice, SdBlockDevice, SdConfig, SpiFlashBlockDevice, SpiFlashConfig,
};
use lfs_blockdev_platform::{ERASED, RamFlash, StreamCard, TokioDelay};

#[derive(Parser, Debug)]
#[command(name = "lfsbd", version)]
#[command(about = "Inspect and modify flash and card images through the littlefs block device adapters", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub device: Device,
}

#[derive(Subcommand, Debug)]
pub enum Device {
    /// SPI NOR flash image
    Nor {
        /// Path to the raw flash image
        image: PathBuf,

        #[command(flatten)]
        options: NorOptions,

        #[command(subcommand)]
        command: Command,
    },

    /// SD/MMC card image
    Sd {
        /// Path to the raw card image
        image: PathBuf,

        #[command(subcommand)]
        command: Command,
    },
}

/// Flash layout of a NOR image.
#[derive(Args, Debug, Clone)]
pub struct NorOptions {
    /// Erase sector size in bytes
    #[arg(long, default_value = "4096", value_parser = parse_u32)]
    pub erase_size: u32,

    /// Program page size in bytes
    #[arg(long, default_value = "256", value_parser = parse_u32)]
    pub prog_size: u32,

    /// First byte of the filesystem window
    #[arg(long, value_parser = parse_u32, requires = "region_size")]
    pub region_start: Option<u32>,

    /// Size of the filesystem window in bytes
    #[arg(long, value_parser = parse_u32, requires = "region_start")]
    pub region_size: Option<u32>,

    /// Use blocking reads instead of interrupt-completed ones
    #[arg(long)]
    pub blocking: bool,
}

impl NorOptions {
    fn config(&self) -> SpiFlashConfig {
        let mut config = SpiFlashConfig::default();
        if let (Some(start), Some(size)) = (self.region_start, self.region_size) {
            config = config.with_region(start, size);
        }
        if self.blocking {
            config = config.blocking_reads();
        }
        config
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the geometry handed to the filesystem
    Info,

    /// Hex dump bytes from a block
    Read {
        /// Block number
        #[arg(long, value_parser = parse_u32)]
        block: u32,

        /// Byte offset within the block
        #[arg(long, default_value = "0", value_parser = parse_u32)]
        offset: u32,

        /// Number of bytes (defaults to the rest of the block)
        #[arg(long, value_parser = parse_u32)]
        len: Option<u32>,
    },

    /// Program hex-encoded bytes into a block
    Write {
        /// Block number
        #[arg(long, value_parser = parse_u32)]
        block: u32,

        /// Byte offset within the block
        #[arg(long, default_value = "0", value_parser = parse_u32)]
        offset: u32,

        /// Data to program, hex encoded
        #[arg(long)]
        hex: String,
    },

    /// Erase a block
    Erase {
        /// Block number
        #[arg(long, value_parser = parse_u32)]
        block: u32,
    },

    /// Create an erased image (NOR only)
    Format {
        /// Image size in bytes
        #[arg(long, value_parser = parse_u32)]
        size: u32,
    },
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.device {
        Device::Nor {
            image,
            options,
            command,
        } => run_nor(&image, &options, command).await,
        Device::Sd { image, command } => run_sd(&image, command).await,
    }
}

async fn run_nor(image: &Path, options: &NorOptions, command: Command) -> Result<()> {
    ensure!(options.erase_size > 0, "erase size must be non-zero");
    ensure!(options.prog_size > 0, "program size must be non-zero");

    if let Command::Format { size } = command {
        ensure!(
            size > 0 && size % options.erase_size == 0,
            "image size {} is not a whole number of {} byte sectors",
            size,
            options.erase_size
        );
        tokio::fs::write(image, vec![ERASED; size as usize])
            .await
            .with_context(|| format!("writing {}", image.display()))?;
        println!("Created {} ({} bytes, erased)", image.display(), size);
        return Ok(());
    }

    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("reading {}", image.display()))?;
    let flash = RamFlash::from_image(bytes, options.erase_size, options.prog_size)
        .with_context(|| format!("loading {}", image.display()))?;
    let bd = SpiFlashBlockDevice::create(flash, options.config(), TokioDelay)
        .with_context(|| format!("opening {} as NOR flash", image.display()))?;
    log::info!("NOR image {} window {}", image.display(), bd.region());

    if execute(&bd, command).await? {
        tokio::fs::write(image, bd.destroy().into_image())
            .await
            .with_context(|| format!("writing {}", image.display()))?;
    }
    Ok(())
}

async fn run_sd(image: &Path, command: Command) -> Result<()> {
    if let Command::Format { .. } = command {
        bail!("format is only available for NOR images");
    }

    let file = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(image)
        .await
        .with_context(|| format!("opening {}", image.display()))?;
    let card = StreamCard::open(FromTokio::new(file))
        .await
        .with_context(|| format!("reading {}", image.display()))?;
    let bd = SdBlockDevice::create(card, SdConfig::default(), TokioDelay)
        .with_context(|| format!("opening {} as an SD card", image.display()))?;

    // The erase hook is a no-op on cards; erase the sector for real
    if let Command::Erase { block } = command {
        check_request(bd.geometry(), block, 0, 0, 1)?;
        bd.erase_sector(block)
            .await
            .with_context(|| format!("erasing sector {}", block))?;
        println!("Erased sector {}", block);
        return Ok(());
    }

    execute(&bd, command).await?;
    Ok(())
}

/// Run `command` against `bd`. Returns whether the medium was modified.
async fn execute<B: LfsBlockDevice>(bd: &B, command: Command) -> Result<bool> {
    let geometry = *bd.geometry();
    match command {
        Command::Info => {
            print!("{}", describe(&geometry));
            Ok(false)
        }
        Command::Read { block, offset, len } => {
            let len = len.unwrap_or(geometry.block_size.saturating_sub(offset));
            check_request(&geometry, block, offset, len as usize, geometry.read_size)?;

            let mut buf = vec![0u8; len as usize];
            bd.read(block, offset, &mut buf)
                .await
                .with_context(|| format!("reading block {}", block))?;
            let base = block as u64 * geometry.block_size as u64 + offset as u64;
            print!("{}", hexdump(base, &buf));
            Ok(false)
        }
        Command::Write { block, offset, hex: encoded } => {
            let data = hex::decode(encoded.trim()).context("decoding --hex")?;
            check_request(&geometry, block, offset, data.len(), geometry.prog_size)?;

            bd.prog(block, offset, &data)
                .await
                .with_context(|| format!("programming block {}", block))?;
            bd.sync().await.context("syncing")?;
            println!("Wrote {} bytes to block {} at offset {}", data.len(), block, offset);
            Ok(true)
        }
        Command::Erase { block } => {
            check_request(&geometry, block, 0, 0, 1)?;
            bd.erase(block)
                .await
                .with_context(|| format!("erasing block {}", block))?;
            println!("Erased block {}", block);
            Ok(true)
        }
        Command::Format { .. } => bail!("format does not operate on an opened device"),
    }
}

/// Reject requests the adapters would treat as contract violations.
fn check_request(geometry: &Geometry, block: u32, offset: u32, len: usize, granularity: u32) -> Result<()> {
    ensure!(
        block < geometry.block_count,
        "block {} out of range, device has {} blocks",
        block,
        geometry.block_count
    );
    ensure!(
        offset % granularity == 0 && len % granularity as usize == 0,
        "offset {} and length {} must be multiples of {}",
        offset,
        len,
        granularity
    );
    let end = block as u64 * geometry.block_size as u64 + offset as u64 + len as u64;
    ensure!(
        end <= geometry.total_size(),
        "{} bytes at block {} offset {} run past the end of the device",
        len,
        block,
        offset
    );
    Ok(())
}

fn describe(geometry: &Geometry) -> String {
    let block_cycles = match geometry.block_cycles {
        Some(cycles) => cycles.to_string(),
        None => "disabled".to_string(),
    };
    format!(
        "read size:      {}\n\
         prog size:      {}\n\
         block size:     {}\n\
         block count:    {}\n\
         cache size:     {}\n\
         lookahead size: {}\n\
         block cycles:   {}\n\
         total:          {} bytes\n",
        geometry.read_size,
        geometry.prog_size,
        geometry.block_size,
        geometry.block_count,
        geometry.cache_size,
        geometry.lookahead_size,
        block_cycles,
        geometry.total_size()
    )
}

fn hexdump(base: u64, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let bytes: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!(
            "{:08x}  {:<47}  |{}|\n",
            base + i as u64 * 16,
            bytes.join(" "),
            ascii
        ));
    }
    out
}
