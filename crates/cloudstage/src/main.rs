mod commands;
mod context;
mod output;

use clap::{Parser, Subcommand};
use cloudstage_provider::ResourceKind;
use context::{Context, Overrides};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_IMAGE: &str = "5cebb13a-f783-4f8c-8058-c4182c724ccd";
const DEFAULT_FLAVOR: &str = "2";

#[derive(Parser)]
#[command(name = "cloudstage")]
#[command(about = "Staged cloud provisioning: servers, images, storage and DNS", long_about = None)]
struct Cli {
    /// Region to provision in
    #[arg(long, global = true, env = "CLOUDSTAGE_REGION")]
    region: Option<String>,

    /// Milliseconds between status checks
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// Maximum seconds to wait for a server build
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Directory holding the sandbox state
    #[arg(long, global = true, env = "CLOUDSTAGE_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a batch of identical servers
    Servers {
        /// Name prefix; servers are named <base>1..<base>N
        #[arg(short, long, default_value = "web")]
        base: String,
        #[arg(short, long, default_value_t = 3)]
        count: usize,
        #[arg(short, long, default_value = DEFAULT_FLAVOR)]
        flavor: String,
        #[arg(short, long, default_value = DEFAULT_IMAGE)]
        image: String,
    },
    /// Image a server and build a new server from that image
    Clone {
        /// Source server name (or id with --by-id)
        source: String,
        /// Name of the new server
        dest: String,
        /// Treat SOURCE as a server id
        #[arg(long)]
        by_id: bool,
        /// Keep the intermediate image
        #[arg(long)]
        keep_image: bool,
    },
    /// Create an A/AAAA record for a host
    Dns {
        fqdn: String,
        /// IPv4 or IPv6 address
        address: String,
        /// Create the zone with this admin email when it is missing
        #[arg(long)]
        zone_email: Option<String>,
    },
    /// Create a server named after a host and point a DNS record at it
    ServerDns {
        fqdn: String,
        #[arg(short, long, default_value = DEFAULT_FLAVOR)]
        flavor: String,
        #[arg(short, long, default_value = DEFAULT_IMAGE)]
        image: String,
    },
    /// Create a CDN-enabled storage container
    Container { name: String },
    /// Publish a static site: container, index page and CNAME
    StaticSite {
        container: String,
        fqdn: String,
        /// Name of the index object
        #[arg(long, default_value = "index.html")]
        index: String,
        /// Index page body
        #[arg(long, conflicts_with = "index_file")]
        body: Option<String>,
        /// Read the index page body from a file
        #[arg(long)]
        index_file: Option<PathBuf>,
    },
    /// Add a DNS zone to the sandbox
    SeedZone {
        domain: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// List resources of a kind
    List {
        /// server, image, container, object, zone or record
        kind: ResourceKind,
    },
    /// Show version information
    Version,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if matches!(cli.command, Commands::Version) {
        println!("cloudstage {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ctx = Context::load(Overrides {
        region: cli.region,
        interval_ms: cli.interval_ms,
        timeout_secs: cli.timeout_secs,
        state_dir: cli.state_dir,
    })
    .await?;

    match cli.command {
        Commands::Servers {
            base,
            count,
            flavor,
            image,
        } => commands::servers::handle(&ctx, &base, count, &flavor, &image).await,
        Commands::Clone {
            source,
            dest,
            by_id,
            keep_image,
        } => commands::clone::handle(&ctx, source, &dest, by_id, !keep_image).await,
        Commands::Dns {
            fqdn,
            address,
            zone_email,
        } => commands::dns::handle_record(&ctx, &fqdn, &address, zone_email).await,
        Commands::ServerDns {
            fqdn,
            flavor,
            image,
        } => commands::dns::handle_server(&ctx, &fqdn, &flavor, &image).await,
        Commands::Container { name } => commands::storage::handle_container(&ctx, &name).await,
        Commands::StaticSite {
            container,
            fqdn,
            index,
            body,
            index_file,
        } => {
            commands::storage::handle_static_site(&ctx, &container, &fqdn, &index, body, index_file)
                .await
        }
        Commands::SeedZone { domain, email } => {
            commands::inventory::handle_seed_zone(&ctx, &domain, email).await
        }
        Commands::List { kind } => commands::inventory::handle_list(&ctx, kind).await,
        Commands::Version => Ok(()),
    }
}
