use crate::context::Context;
use crate::output;
use anyhow::Context as _;
use cloudstage_engine::workflows::{self, Fqdn};
use std::path::PathBuf;

const DEFAULT_BODY: &str = "<html><body><h1>It works!</h1></body></html>\n";

pub async fn handle_container(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let result = ctx.run(workflows::public_container(name, &ctx.profile)).await;

    if let Some(container) = result.states("container").first() {
        output::print_container(container);
    }
    output::finish(&result)
}

pub async fn handle_static_site(
    ctx: &Context,
    container: &str,
    fqdn: &str,
    index: &str,
    body: Option<String>,
    index_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let fqdn = Fqdn::parse(fqdn)?;
    let body = match (body, index_file) {
        (Some(body), _) => body,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => DEFAULT_BODY.to_string(),
    };
    let stages = workflows::static_site(container, &fqdn, index, &body, &ctx.profile);

    let result = ctx.run(stages).await;

    if let Some(container) = result.states("container").first() {
        output::print_container(container);
    }
    if let Some(object) = result.states("index").first() {
        println!("Index {} uploaded", object.name);
    }
    output::print_records(result.output("record"));
    output::finish(&result)
}
