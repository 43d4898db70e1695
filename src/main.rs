// Command-line crawl runner.
//
// Crawls a seed URL and prints one JSON page result per line, with a
// summary on stderr. The heavy lifting lives in the library; this binary
// is flag parsing and event plumbing.

use anyhow::{Context, Result, anyhow};
use log::error;
use std::sync::Arc;

use sitehound::{CrawlConfig, CrawlEvent, CrawlEventBus, Crawler, RendererConfig, RobotsMode};

const USAGE: &str = "Usage: sitehound <seed-url> [options]

Options:
  --depth <n>           Maximum link depth (default 3)
  --parallelism <n>     Concurrent workers (default 8)
  --subdomains          Include subdomains of the seed host
  --single-page         Fetch only the seed; record links without following
  --robots <mode>       respect | ignore | ignore-report (default respect)
  --render              Fetch pages through the headless renderer
  --user-agent <ua>     Override the User-Agent header
";

struct Args {
    seed: String,
    depth: u16,
    parallelism: usize,
    subdomains: bool,
    single_page: bool,
    robots: RobotsMode,
    render: bool,
    user_agent: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        seed: String::new(),
        depth: 3,
        parallelism: 8,
        subdomains: false,
        single_page: false,
        robots: RobotsMode::Respect,
        render: false,
        user_agent: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--depth" => {
                parsed.depth = args
                    .next()
                    .ok_or_else(|| anyhow!("--depth needs a value"))?
                    .parse()
                    .context("--depth must be a number")?;
            }
            "--parallelism" => {
                parsed.parallelism = args
                    .next()
                    .ok_or_else(|| anyhow!("--parallelism needs a value"))?
                    .parse()
                    .context("--parallelism must be a number")?;
            }
            "--subdomains" => parsed.subdomains = true,
            "--single-page" => parsed.single_page = true,
            "--render" => parsed.render = true,
            "--robots" => {
                parsed.robots = match args
                    .next()
                    .ok_or_else(|| anyhow!("--robots needs a value"))?
                    .as_str()
                {
                    "respect" => RobotsMode::Respect,
                    "ignore" => RobotsMode::Ignore,
                    "ignore-report" => RobotsMode::IgnoreReport,
                    other => return Err(anyhow!("Unknown robots mode '{other}'")),
                };
            }
            "--user-agent" => {
                parsed.user_agent =
                    Some(args.next().ok_or_else(|| anyhow!("--user-agent needs a value"))?);
            }
            "--help" | "-h" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other if parsed.seed.is_empty() && !other.starts_with('-') => {
                parsed.seed = other.to_string();
            }
            other => return Err(anyhow!("Unknown argument '{other}'\n{USAGE}")),
        }
    }

    if parsed.seed.is_empty() {
        return Err(anyhow!("Missing seed URL\n{USAGE}"));
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;

    let mut builder = CrawlConfig::builder()
        .seed_url(&args.seed)
        .max_depth(args.depth)
        .parallelism(args.parallelism)
        .include_subdomains(args.subdomains)
        .single_page(args.single_page)
        .robots_mode(args.robots);
    if args.render {
        builder = builder.renderer(RendererConfig::default());
    }
    if let Some(user_agent) = args.user_agent {
        builder = builder.user_agent(user_agent);
    }
    let config = builder.build()?;

    let bus = Arc::new(CrawlEventBus::default());
    let mut receiver = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match event {
                CrawlEvent::Page { result, .. } => match serde_json::to_string(&result) {
                    Ok(line) => println!("{line}"),
                    Err(e) => error!("Failed to serialize page result: {e}"),
                },
                CrawlEvent::Error { url, error, .. } => {
                    eprintln!("error {url}: {error}");
                }
                CrawlEvent::Shutdown { .. } => break,
                _ => {}
            }
        }
    });

    let crawler = Crawler::new(config)?.with_event_bus(Arc::clone(&bus));

    let crawler = Arc::new(crawler);
    {
        let crawler = Arc::clone(&crawler);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupt received, cancelling crawl...");
                crawler.cancel();
            }
        });
    }

    let summary = crawler.run().await?;
    let _ = printer.await;

    eprintln!(
        "{:?}: {} pages ({} URLs, {} discovered) in {:.1}s",
        summary.state,
        summary.pages_crawled,
        summary.total_urls_crawled,
        summary.total_discovered,
        summary.duration.as_secs_f64()
    );
    Ok(())
}
