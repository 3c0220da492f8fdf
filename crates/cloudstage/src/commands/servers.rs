use crate::context::Context;
use crate::output;
use cloudstage_engine::workflows;
use colored::Colorize;

pub async fn handle(
    ctx: &Context,
    base: &str,
    count: usize,
    flavor: &str,
    image: &str,
) -> anyhow::Result<()> {
    let stages = workflows::server_batch(base, count, flavor, image, &ctx.profile)?;

    eprintln!(
        "{} {} server(s) in {} (timeout {}s)",
        "Creating".blue(),
        count,
        ctx.settings.region.cyan(),
        ctx.profile.server.timeout().as_secs()
    );
    let result = ctx.run(stages).await;

    output::print_servers(result.states("servers"));
    output::finish(&result)
}
