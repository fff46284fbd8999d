use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use relaypulse::config::{parse_alpha, AggregatorConfig};
use relaypulse::feed::FeedConfig;
use relaypulse::network::Network;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the chains tracked per network
    Chains {
        /// Only show this network
        #[arg(long, value_enum)]
        network: Option<Network>,
        /// Chain registry JSON file (defaults to the built-in set)
        #[arg(long)]
        registry: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ChainsFormat::Text)]
        format: ChainsFormat,
    },
    /// Connect to a consumption feed and show live throughput
    Watch(Watch),
    /// Serve a synthetic consumption feed
    Mock(Mock),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ChainsFormat {
    Text,
    Json,
}

#[derive(Parser, Clone, Debug)]
pub struct Watch {
    /// Feed WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:5757")]
    pub url: String,

    /// Network selected at startup (Tab switches in the dashboard)
    #[arg(long, value_enum, default_value_t = Network::Polkadot)]
    pub network: Network,

    /// Chain registry JSON file (defaults to the built-in set)
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Trailing window for rate computation, in milliseconds
    #[arg(long, default_value_t = 60_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub window_ms: u64,

    /// Records kept per network
    #[arg(long, default_value_t = 1_024, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_blocks: u64,

    /// Smoothing factor in (0, 1]
    #[arg(long, default_value_t = 0.3, value_parser = parse_alpha)]
    pub alpha: f64,

    /// System extrinsics subtracted from every block
    #[arg(long, default_value_t = 2)]
    pub system_extrinsics: u64,

    /// Block time assumed when the feed omits it, in seconds
    #[arg(long, default_value_t = 6.0)]
    pub default_block_time: f64,

    /// `authorities_num` value meaning "unknown"
    #[arg(long, default_value_t = u32::MAX as u64)]
    pub unknown_authorities: u64,

    /// Delay before reconnecting to the feed, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub retry_ms: u64,

    /// Log throughput instead of drawing the dashboard
    #[arg(long)]
    pub headless: bool,

    /// Seconds between headless throughput reports
    #[arg(long, default_value_t = 5)]
    pub report_secs: u64,
}

impl Watch {
    pub fn aggregator_config(&self) -> AggregatorConfig {
        let default_block_time_secs =
            if self.default_block_time > 0.0 { self.default_block_time } else { AggregatorConfig::default().default_block_time_secs };
        AggregatorConfig {
            window_ms: self.window_ms,
            max_blocks_store: self.max_blocks as usize,
            alpha: self.alpha,
            system_extrinsic_offset: self.system_extrinsics,
            default_block_time_secs,
            unknown_authorities_sentinel: self.unknown_authorities,
            ..AggregatorConfig::default()
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig { url: self.url.clone(), retry: Duration::from_millis(self.retry_ms) }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct Mock {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:5757")]
    pub host: SocketAddr,

    /// Only emit updates for this network
    #[arg(long, value_enum)]
    pub network: Option<Network>,

    /// Chain registry JSON file (defaults to the built-in set)
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Milliseconds between blocks
    #[arg(long, default_value_t = 1_000)]
    pub interval_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_defaults_map_to_config() {
        let cli = Cli::parse_from(["relaypulse", "watch"]);
        let Some(Commands::Watch(watch)) = cli.command else { panic!("expected watch") };
        let cfg = watch.aggregator_config();
        assert_eq!(cfg.window_ms, 60_000);
        assert_eq!(cfg.max_blocks_store, 1_024);
        assert_eq!(cfg.alpha, 0.3);
        assert_eq!(watch.feed_config().retry, Duration::from_secs(5));
    }

    #[test]
    fn watch_rejects_bad_tunables() {
        assert!(Cli::try_parse_from(["relaypulse", "watch", "--alpha", "0"]).is_err());
        assert!(Cli::try_parse_from(["relaypulse", "watch", "--max-blocks", "0"]).is_err());
        assert!(Cli::try_parse_from(["relaypulse", "watch", "--window-ms", "0"]).is_err());
    }

    #[test]
    fn network_flag_parses() {
        let cli = Cli::parse_from(["relaypulse", "watch", "--network", "kusama", "--headless"]);
        let Some(Commands::Watch(watch)) = cli.command else { panic!("expected watch") };
        assert_eq!(watch.network, Network::Kusama);
        assert!(watch.headless);
    }
}
