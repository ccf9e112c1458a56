use clap::Parser;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::*;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use gtpu_tunnel::TunnelBatch;

mod packet_metadata;
mod process;
mod stats;

use process::{Direction, Replay};

#[derive(Parser, Debug)]
#[command(name = "gtpu-replay")]
#[command(about = "Replay a capture through the GTP-U encap/decap engine", long_about = None)]
struct Args {
    /// Path to the PCAP file to read
    #[arg(short, long, value_name = "FILE")]
    pcap: PathBuf,

    /// JSON tunnel batch ({"attr": [...]}) used to build contexts
    #[arg(short, long, value_name = "FILE")]
    tunnels: Option<PathBuf>,

    /// Transform applied to every frame
    #[arg(short, long, value_enum, default_value_t = Direction::Encap)]
    mode: Direction,

    /// Port the handler is bound to; frames are replayed on it
    #[arg(long, default_value_t = 0)]
    port: u8,

    /// Headroom reserved in front of every frame
    #[arg(long, default_value_t = 128)]
    headroom: usize,

    /// dump transformed packet headers
    #[arg(short, long)]
    dump_packet: bool,

    /// print statistics at the end
    #[arg(short, long)]
    stats: bool,
}

fn main() {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let replay = match load_tunnels(args.tunnels.as_deref()).and_then(|batch| {
        Replay::new(args.mode, args.port, args.headroom, &batch, args.dump_packet)
    }) {
        Ok(replay) => replay,
        Err(e) => {
            error!("Failed to set up tunnels: {}", e);
            std::process::exit(1);
        }
    };

    let stats = stats::Stats::default();

    info!("Reading PCAP file: {:?} ({:?})", args.pcap, args.mode);
    if let Err(e) = process_pcap(&args.pcap, &replay, &stats) {
        error!("Failed to process PCAP file: {}", e);
        std::process::exit(1);
    }
    if args.stats {
        println!("{stats}");
    }
    info!("PCAP processing completed!");
}

fn load_tunnels(path: Option<&Path>) -> Result<TunnelBatch, String> {
    let Some(path) = path else {
        info!("No tunnel batch given, encapsulation will find no contexts");
        return Ok(TunnelBatch::default());
    };
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    TunnelBatch::from_reader(BufReader::new(file)).map_err(|e| format!("{}: {}", path.display(), e))
}

/// The engine only understands Ethernet framing.
fn check_link_type(link_type: Linktype) -> Result<(), String> {
    if link_type != Linktype::ETHERNET {
        return Err(format!(
            "unsupported link type {:?}, only Ethernet captures can be replayed",
            link_type
        ));
    }
    Ok(())
}

/// Process PCAP file packet by packet
fn process_pcap(pcap_path: &Path, replay: &Replay, stats: &stats::Stats) -> Result<(), String> {
    let mut local_stats = stats::LocalStats::new();

    let open = || File::open(pcap_path).map_err(|e| format!("{}: {}", pcap_path.display(), e));

    let mut packet_count = 0;
    let mut bytes_count = 0;

    let start = std::time::Instant::now();

    // Try to create a PCAPNG reader first
    match PcapNGReader::new(65536, open()?) {
        Ok(mut reader) => {
            info!("Detected PCAPNG format");
            loop {
                match reader.next() {
                    Ok((offset, block)) => {
                        match block {
                            PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                                packet_count += 1;
                                bytes_count += epb.caplen as u64;
                                replay.process_packet(packet_count, &epb, &mut local_stats, stats);
                            }
                            PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                                packet_count += 1;
                                bytes_count += spb.origlen as u64;
                                replay.process_packet(packet_count, &spb, &mut local_stats, stats);
                            }
                            PcapBlockOwned::NG(Block::SectionHeader(_shb)) => {
                                info!("PCAPNG Section Header found");
                            }
                            PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                                info!("PCAPNG Interface Description found: {:?}", idb.linktype);
                                check_link_type(idb.linktype)?;
                            }
                            _ => {}
                        }
                        reader.consume(offset);
                    }
                    Err(PcapError::Eof) => break,
                    Err(PcapError::Incomplete(_)) => {
                        reader
                            .refill()
                            .map_err(|e| format!("Error reading PCAPNG: {:?}", e))?;
                    }
                    Err(e) => {
                        return Err(format!("Error reading PCAPNG: {:?}", e));
                    }
                }
            }
        }
        Err(_) => {
            // Try legacy PCAP format
            let mut reader = LegacyPcapReader::new(65536, open()?)
                .map_err(|e| format!("Failed to create PCAP reader: {:?}", e))?;

            loop {
                match reader.next() {
                    Ok((offset, block)) => {
                        match block {
                            PcapBlockOwned::Legacy(packet) => {
                                packet_count += 1;
                                bytes_count += packet.caplen as u64;
                                replay.process_packet(
                                    packet_count,
                                    &packet,
                                    &mut local_stats,
                                    stats,
                                );
                            }
                            PcapBlockOwned::LegacyHeader(header) => {
                                info!("Legacy PCAP header found: {:?}", header.network);
                                check_link_type(header.network)?;
                            }
                            _ => {}
                        }
                        reader.consume(offset);
                    }
                    Err(PcapError::Eof) => break,
                    Err(PcapError::Incomplete(_)) => {
                        reader
                            .refill()
                            .map_err(|e| format!("Error reading PCAP: {:?}", e))?;
                    }
                    Err(e) => {
                        return Err(format!("Error reading PCAP: {:?}", e));
                    }
                }
            }
        }
    }

    // Final flush of local stats
    local_stats.flush(stats);

    info!(
        "Total packets processed: {}, {:.3}M pkt/sec, {:.3} Gbps",
        packet_count,
        (packet_count as f64 / start.elapsed().as_secs_f64()) / 1_000_000.0,
        (bytes_count as f64 * 8.0) / (start.elapsed().as_secs_f64() * 1_000_000_000.0)
    );
    Ok(())
}
