use crate::context::Context;
use crate::output;
use cloudstage_provider::{ResourceKind, ResourceProvider, ResourceSpec};
use colored::Colorize;

pub async fn handle_seed_zone(
    ctx: &Context,
    domain: &str,
    email: Option<String>,
) -> anyhow::Result<()> {
    let zone = ctx.provider.seed(ResourceSpec::zone(domain, email)).await?;
    println!("Zone {} ready ({})", zone.name.cyan(), zone.id);
    Ok(())
}

pub async fn handle_list(ctx: &Context, kind: ResourceKind) -> anyhow::Result<()> {
    let states = ctx.provider.list(kind).await?;
    if states.is_empty() {
        println!("{}", format!("No {} resources", kind).dimmed());
        return Ok(());
    }
    for state in &states {
        println!("{}", output::listing_line(state));
    }
    Ok(())
}
