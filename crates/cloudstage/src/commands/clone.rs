use crate::context::Context;
use crate::output;
use cloudstage_engine::workflows::{self, Locator};
use cloudstage_provider::ResourceKind;
use colored::Colorize;

pub async fn handle(
    ctx: &Context,
    source: String,
    dest: &str,
    by_id: bool,
    delete_image: bool,
) -> anyhow::Result<()> {
    let locator = if by_id {
        Locator::Id(source)
    } else {
        Locator::Name(source)
    };
    let source = workflows::locate(ctx.provider.as_ref(), ResourceKind::Server, &locator).await?;
    let stages = workflows::clone_server(&source, dest, delete_image, &ctx.profile)?;

    eprintln!(
        "{} {} as {}",
        "Cloning".blue(),
        source.name.cyan(),
        dest.cyan()
    );
    let result = ctx.run(stages).await;

    if let Some(image) = result.states("image").first() {
        let kept = if delete_image { "" } else { " (kept)" };
        println!("Image {}: {}{}", image.name, image.id, kept);
    }
    output::print_servers(result.states("server"));
    if result.output("delete-image").is_some() {
        println!("Image deleted");
    }
    output::finish(&result)
}
