//! VDI access utility
//!
//! Opens a VDI on a sheepdog cluster and prints its geometry, reads a
//! range to stdout, writes stdin into a range, or flushes it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::io::{Read, Write};
use std::path::PathBuf;

use sheepdog_store::client::TcpDial;
use sheepdog_store::protocol::types::SD_DEFAULT_ADDR;
use sheepdog_store::{Config, VdiSession};

#[derive(Parser, Debug)]
#[command(name = "vdi-io")]
#[command(about = "Inspect and access VDIs on a sheepdog cluster", long_about = None)]
struct Args {
    /// Cluster address (host:port); overrides the configuration file
    #[arg(short, long)]
    addr: Option<String>,

    /// Configuration file supplying the cluster address
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// VDI name
    vdi: String,

    #[command(subcommand)]
    op: Op,
}

#[derive(Subcommand, Debug)]
enum Op {
    /// Print volume geometry
    Info,
    /// Read a range to stdout
    Read {
        #[arg(short, long, default_value_t = 0)]
        offset: u64,

        /// Bytes to read
        #[arg(short, long)]
        length: u64,
    },
    /// Write stdin into a range
    Write {
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
    },
    /// Flush the volume
    Sync,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let addr = match (&args.addr, &args.config) {
        (Some(addr), _) => addr.clone(),
        (None, Some(path)) => {
            Config::load(path)
                .with_context(|| format!("loading {:?}", path))?
                .store
                .addr
        }
        (None, None) => SD_DEFAULT_ADDR.to_string(),
    };

    let mut session = VdiSession::open(TcpDial::new(addr), &args.vdi)
        .with_context(|| format!("opening VDI {:?}", args.vdi))?;

    let outcome = run(&mut session, &args.op);
    session.close();
    outcome
}

fn run(session: &mut VdiSession<TcpDial>, op: &Op) -> Result<()> {
    match *op {
        Op::Info => {
            let inode = session.inode();
            println!("name:    {}", inode.name_str());
            println!("vdi id:  {:#x}", inode.vdi_id);
            println!("size:    {} bytes", inode.vdi_size);
            println!("copies:  {}", inode.nr_copies);
            println!("snap id: {}", inode.snap_id);
            if inode.parent_vdi_id != 0 {
                println!("parent:  {:#x}", inode.parent_vdi_id);
            }
        }
        Op::Read { offset, length } => {
            let mut buf = vec![0u8; length as usize];
            session.read_at(&mut buf, offset).context("read failed")?;
            std::io::stdout()
                .write_all(&buf)
                .context("writing to stdout")?;
        }
        Op::Write { offset } => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .context("reading stdin")?;
            session.write_at(&data, offset).context("write failed")?;
            log::info!("wrote {} bytes at offset {}", data.len(), offset);
        }
        Op::Sync => session.sync().context("flush failed")?,
    }
    Ok(())
}
