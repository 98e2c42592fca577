//! rulegate: convert, inspect and serve proxy rule sets.

use clap::{Parser, Subcommand};
use rulegate::asn::AsnResolverBuilder;
use rulegate::cache::MemoryCache;
use rulegate::mrs::summarize;
use rulegate::source::RemoteSource;
use rulegate::{
    Behavior, ConversionService, ConvertOptions, Convertors, GatewayConfig, Metadata,
    ServeRequest,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "rulegate")]
#[command(version)]
#[command(about = "Convert proxy rule sets between source, MRS and Clash formats", long_about = None)]
struct Cli {
    /// Gateway config file (.yaml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a local rule-set file
    Convert {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Input format id
        #[arg(long, default_value = "source")]
        from: String,

        /// Output format id
        #[arg(long, default_value = "mrs")]
        to: String,

        /// Entry kind: domain, ipcidr or classical
        #[arg(short, long)]
        behavior: Option<String>,

        /// Client user agent to convert for
        #[arg(short, long)]
        user_agent: Option<String>,
    },

    /// Print the behavior and entry count of an MRS file
    Inspect {
        /// MRS file
        input: PathBuf,
    },

    /// Resolve ASNs to announced IP prefixes
    ResolveAsn {
        /// ASNs such as 13335 or AS15169
        #[arg(required = true)]
        asns: Vec<String>,
    },

    /// Fetch a rule set from the configured source and convert it
    Fetch {
        /// Rule-set name substituted into the source URL
        name: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "source")]
        from: String,

        #[arg(long, default_value = "mrs")]
        to: String,

        #[arg(short, long)]
        behavior: Option<String>,

        #[arg(short, long)]
        user_agent: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };

    match cli.command {
        Commands::Convert {
            input,
            output,
            from,
            to,
            behavior,
            user_agent,
        } => {
            let options = convert_options(&config, behavior.as_deref(), user_agent.as_deref())?;
            convert_file(&input, &output, &from, &to, &options).await
        }
        Commands::Inspect { input } => inspect(&input),
        Commands::ResolveAsn { asns } => resolve_asn(&config, &asns).await,
        Commands::Fetch {
            name,
            output,
            from,
            to,
            behavior,
            user_agent,
        } => {
            let mut request = ServeRequest::new(name, from, to);
            if let Some(behavior) = parse_behavior(behavior.as_deref())? {
                request = request.with_behavior(behavior);
            }
            if let Some(user_agent) = user_agent {
                request = request.with_metadata(Metadata::detect(&user_agent));
            }
            fetch(&config, &request, &output).await
        }
    }
}

fn parse_behavior(raw: Option<&str>) -> CliResult<Option<Behavior>> {
    match raw {
        Some(raw) => Behavior::parse(raw)
            .map(Some)
            .ok_or_else(|| format!("unknown behavior: {}", raw).into()),
        None => Ok(None),
    }
}

fn convert_options(
    config: &GatewayConfig,
    behavior: Option<&str>,
    user_agent: Option<&str>,
) -> CliResult<ConvertOptions> {
    let metadata = user_agent.map(Metadata::detect).unwrap_or_default();
    let mut options =
        ConvertOptions::new(metadata).with_asn(AsnResolverBuilder::from_config(&config.asn)?);
    if let Some(behavior) = parse_behavior(behavior)? {
        options = options.with_behavior(behavior);
    }
    Ok(options)
}

async fn convert_file(
    input: &Path,
    output: &Path,
    from: &str,
    to: &str,
    options: &ConvertOptions,
) -> CliResult<()> {
    let content = fs::read(input)?;
    let convertors = Convertors::with_defaults(None);
    let converted = convertors.convert(&content, from, to, options).await?;
    fs::write(output, &converted)?;

    println!(
        "Converted {:?} ({}) -> {:?} ({}): {} bytes",
        input,
        from,
        output,
        to,
        converted.len()
    );
    Ok(())
}

fn inspect(input: &Path) -> CliResult<()> {
    let content = fs::read(input)?;
    let summary = summarize(&content)?;
    println!("File:     {:?}", input);
    println!("Size:     {} bytes", content.len());
    println!("Behavior: {}", summary.behavior);
    println!("Entries:  {}", summary.entries);
    Ok(())
}

async fn resolve_asn(config: &GatewayConfig, asns: &[String]) -> CliResult<()> {
    let resolver = AsnResolverBuilder::from_config(&config.asn)?.build();
    let prefixes = resolver.resolve_many(asns.iter().map(String::as_str)).await?;
    for prefix in &prefixes {
        println!("{}", prefix);
    }
    log::info!("Resolved {} ASNs to {} prefixes", asns.len(), prefixes.len());
    Ok(())
}

async fn fetch(config: &GatewayConfig, request: &ServeRequest, output: &Path) -> CliResult<()> {
    let service = ConversionService::new(
        Arc::new(RemoteSource::new(config.source.clone())),
        Arc::new(MemoryCache::from_config(&config.cache)),
        Convertors::with_defaults(None),
    )
    .with_cache_ttl(config.cache.ttl())
    .with_asn(AsnResolverBuilder::from_config(&config.asn)?);

    let response = service.serve(request).await?;
    fs::write(output, &response.content)?;
    println!(
        "Fetched {} as {} ({}): {} bytes",
        request.name,
        request.to,
        response.content_type,
        response.content.len()
    );
    Ok(())
}
