use crate::context::Context;
use crate::output;
use cloudstage_engine::workflows::{self, Fqdn};
use colored::Colorize;

pub async fn handle_record(
    ctx: &Context,
    fqdn: &str,
    address: &str,
    zone_email: Option<String>,
) -> anyhow::Result<()> {
    let fqdn = Fqdn::parse(fqdn)?;
    let stages = workflows::dns_record(&fqdn, address, zone_email, &ctx.profile)?;

    let result = ctx.run(stages).await;

    output::print_records(result.output("record"));
    output::finish(&result)
}

pub async fn handle_server(
    ctx: &Context,
    fqdn: &str,
    flavor: &str,
    image: &str,
) -> anyhow::Result<()> {
    let fqdn = Fqdn::parse(fqdn)?;
    let stages = workflows::server_with_dns(&fqdn, flavor, image, &ctx.profile);

    eprintln!(
        "{} {} in zone {}",
        "Creating".blue(),
        fqdn.name().cyan(),
        fqdn.domain().cyan()
    );
    let result = ctx.run(stages).await;

    output::print_servers(result.states("server"));
    output::print_records(result.output("record"));
    output::finish(&result)
}
