// CLI configuration
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use nowplaying::ogg::{AssemblerOptions, ReaderOptions, ResyncPolicy};
use nowplaying::vorbis::DecoderOptions;
use nowplaying::{FileMode, MetadataDispatcher, OutputFormat, PipelineOptions, ServerConfig, SinkOptions, DEFAULT_PORT};

const EPILOG: &str = "Point the broadcast settings of your DJ software at this machine and the \
port given with -p/--port (defaults to 8000). Any format works; the lowest bitrate for your \
sample rate (usually 44100 Hz, 64 kbps) keeps the load down.";

/// Print what your DJ software is playing, read from its broadcast stream
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "nowplaying")]
#[command(about = "Extract now-playing metadata from an Ogg Vorbis broadcast", long_about = None)]
#[command(after_help = EPILOG)]
#[command(version)]
#[command(author = "xwsjjctz <xwsjjctz@icloud.com>")]
pub struct Config {
    /// Port to listen on for the broadcast
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to listen on
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Quiet mode (no track lines on the console, warnings only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Also write each track to this file
    #[arg(short, long, value_name = "FILE")]
    pub outfile: Option<PathBuf>,

    /// Keep only the current track in the output file
    #[arg(long, requires = "outfile")]
    pub overwrite: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Skip a track repeating the previous one on the same connection
    #[arg(long)]
    pub dedupe: bool,

    /// Announcements no longer than this many characters are dropped
    #[arg(long, value_name = "CHARS", default_value_t = MetadataDispatcher::DEFAULT_MIN_DISPLAY_LEN)]
    pub min_display_len: usize,

    /// Accept pages with a wrong checksum
    #[arg(long)]
    pub no_verify_checksum: bool,

    /// Scan for the next page after corrupt data instead of dropping the connection
    #[arg(long)]
    pub resync: bool,

    /// Bytes to scan before giving up a resync
    #[arg(long, value_name = "BYTES", default_value_t = ResyncPolicy::DEFAULT_SCAN_LIMIT, value_parser = parse_positive)]
    pub resync_limit: usize,

    /// Drop a source that stays silent for this many seconds
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub idle_timeout: Option<Duration>,

    /// Largest packet reassembled, in bytes
    #[arg(long, value_name = "BYTES", default_value_t = AssemblerOptions::DEFAULT_MAX_PACKET_SIZE, value_parser = parse_positive)]
    pub max_packet_size: usize,

    /// Reject comment packets without a framing bit
    #[arg(long)]
    pub strict_framing: bool,

    /// Set port, quiet mode and output file at startup (overrides the options above)
    #[arg(short, long)]
    pub interactive: bool,

    /// Subcommand (listens when omitted)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, Serialize)]
pub enum Command {
    /// Listen for a broadcast (the default)
    Listen,

    /// Read tracks from recorded Ogg files
    Scan {
        /// Ogg file path(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
}

impl Config {
    pub fn pipeline_options(&self) -> PipelineOptions {
        let resync = if self.resync {
            ResyncPolicy::Scan { max_bytes: self.resync_limit }
        } else {
            ResyncPolicy::Fail
        };
        PipelineOptions {
            reader: ReaderOptions { verify_checksum: !self.no_verify_checksum, resync },
            assembler: AssemblerOptions { max_packet_size: self.max_packet_size },
            decoder: DecoderOptions { strict_framing: self.strict_framing },
            dedupe: self.dedupe,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            port: self.port,
            idle_timeout: self.idle_timeout,
            pipeline: self.pipeline_options(),
        }
    }

    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            console: !self.quiet,
            outfile: self.outfile.clone(),
            file_mode: if self.overwrite { FileMode::Overwrite } else { FileMode::Append },
            format: self.format,
            min_display_len: self.min_display_len,
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    match value.parse::<u64>() {
        Ok(0) => Err("must be at least 1 second".to_string()),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be greater than 0".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["nowplaying"]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(config.command.is_none());

        let options = config.pipeline_options();
        assert!(options.reader.verify_checksum);
        assert_eq!(options.reader.resync, ResyncPolicy::Fail);
        assert!(!options.dedupe);

        let sinks = config.sink_options();
        assert!(sinks.console);
        assert_eq!(sinks.file_mode, FileMode::Append);
        assert_eq!(sinks.min_display_len, 3);
    }

    #[test]
    fn maps_flags_onto_options() {
        let config = Config::try_parse_from([
            "nowplaying", "-p", "9000", "-q", "-o", "np.txt", "--overwrite", "--resync",
            "--resync-limit", "4096", "--idle-timeout", "30", "--format", "json",
        ])
        .unwrap();

        let server = config.server_config();
        assert_eq!(server.port, 9000);
        assert_eq!(server.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(server.pipeline.reader.resync, ResyncPolicy::Scan { max_bytes: 4096 });

        let sinks = config.sink_options();
        assert!(!sinks.console);
        assert_eq!(sinks.outfile, Some(PathBuf::from("np.txt")));
        assert_eq!(sinks.file_mode, FileMode::Overwrite);
        assert_eq!(sinks.format, OutputFormat::Json);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::try_parse_from(["nowplaying", "--overwrite"]).is_err());
        assert!(Config::try_parse_from(["nowplaying", "--idle-timeout", "0"]).is_err());
        assert!(Config::try_parse_from(["nowplaying", "--max-packet-size", "0"]).is_err());
        assert!(Config::try_parse_from(["nowplaying", "-p", "70000"]).is_err());
        assert!(Config::try_parse_from(["nowplaying", "scan"]).is_err());
    }

    #[test]
    fn scan_takes_files() {
        let config = Config::try_parse_from(["nowplaying", "scan", "a.ogg", "b.ogg"]).unwrap();
        match config.command {
            Some(Command::Scan { files }) => assert_eq!(files.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
