//! `stratum resolve`: query through a network scope's private resolver.

use anyhow::{Context as _, Result};
use colored::Colorize;
use privdns::{Answer, DohResolver, Forwarder, PublicResolver, RecurseReason, Resolver, StaticResolver};
use std::fs;
use std::sync::Arc;

use super::Exit;
use crate::Context;
use crate::cli::{GlobalArgs, ResolveArgs};
use crate::config::{ResolverConfig, StratumConfig};
use crate::engine::planner::open_backend;
use crate::{paths, ui};

pub fn run(ctx: &Context, global: &GlobalArgs, args: &ResolveArgs) -> Result<Exit> {
    let config = StratumConfig::load(global.config.as_deref())?;
    let backend = open_backend(&config, global)?;

    let upstream = default_upstream(&config.resolver, args.upstream.as_deref())?;
    let mut resolver = Resolver::new(args.network.clone(), backend.zones(), upstream);
    for (suffix, endpoint) in &config.resolver.forwarders {
        let forwarder: Arc<dyn PublicResolver> = Arc::new(DohResolver::new(endpoint.clone()));
        resolver = resolver.with_forwarder(Forwarder::new(suffix, forwarder));
    }

    let resolution = resolver
        .resolve(&args.name)
        .with_context(|| format!("Failed to resolve {}", args.name))?;

    match &resolution.answer {
        Answer::Private { zone, address } => {
            println!("{} {}", resolution.name.bold(), address.to_string().green());
            if !ctx.quiet {
                ui::kv("source", &format!("private zone {zone}"));
            }
        }
        Answer::Public { addresses } => {
            for address in addresses {
                println!("{} {}", resolution.name.bold(), address.to_string().cyan());
            }
        }
        Answer::NxDomain => println!("{} {}", resolution.name.bold(), "NXDOMAIN".red()),
    }

    if !ctx.quiet {
        if let Some(reason) = &resolution.recurse_reason {
            ui::kv("recursed", &describe(reason));
        }
        if let Some(upstream) = &resolution.upstream {
            ui::kv("upstream", upstream);
        }
        let path: Vec<String> = resolution.path.iter().map(ToString::to_string).collect();
        ui::kv("path", &path.join(" → "));
    }

    Ok(if resolution.answer == Answer::NxDomain {
        Exit::Invalid
    } else {
        Exit::Success
    })
}

/// Recursion target: DNS-over-HTTPS when configured, else a hosts table.
fn default_upstream(config: &ResolverConfig, flag: Option<&str>) -> Result<Arc<dyn PublicResolver>> {
    if let Some(url) = flag.or(config.upstream.as_deref()) {
        return Ok(Arc::new(DohResolver::new(url)));
    }
    if let Some(hosts) = &config.hosts {
        let path = paths::expand(hosts);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read hosts file {}", path.display()))?;
        return Ok(Arc::new(StaticResolver::parse_hosts(&content)?));
    }
    log::info!("No upstream configured; names outside private zones resolve to NXDOMAIN");
    Ok(Arc::new(StaticResolver::new()))
}

fn describe(reason: &RecurseReason) -> String {
    match reason {
        RecurseReason::NoZone => "no private zone owns the name".to_string(),
        RecurseReason::NotLinked(zone) => format!("zone {zone} is not linked to this network"),
        RecurseReason::NoRecord(zone) => format!("zone {zone} has no record for the name"),
    }
}
