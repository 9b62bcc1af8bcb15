use super::Context;
use crate::{OutputFormat, RegistryCommands};

pub(crate) async fn run(command: RegistryCommands, ctx: &Context) {
    let registry = ctx.registry();
    let retry = &ctx.config.registry.retry;
    match command {
        RegistryCommands::Publish { name, value } => {
            if let Err(e) = registry.publish_with_retry(&name, &value, retry).await {
                ctx.fail(&format!("could not publish '{}': {}", name, e));
            }
            match ctx.output {
                OutputFormat::Json => ctx.print_json(&serde_json::json!({
                    "scope": registry.scope(),
                    "name": name,
                    "value": value,
                })),
                OutputFormat::Text => {
                    if !ctx.quiet {
                        println!("published {} in scope '{}'", name, registry.scope());
                    }
                }
            }
        }
        RegistryCommands::Resolve { name } => match registry.resolve_with_retry(&name, retry).await {
            Ok(Some(value)) => match ctx.output {
                OutputFormat::Json => ctx.print_json(&serde_json::json!({
                    "name": name,
                    "value": value,
                })),
                OutputFormat::Text => println!("{}", value),
            },
            Ok(None) => ctx.fail(&format!(
                "resource '{}' is not published in scope '{}'",
                name,
                registry.scope()
            )),
            Err(e) => ctx.fail(&format!("could not resolve '{}': {}", name, e)),
        },
        RegistryCommands::List => match registry.entries().await {
            Ok(entries) => match ctx.output {
                OutputFormat::Json => ctx.print_json(&entries),
                OutputFormat::Text => {
                    for entry in &entries {
                        println!("{} = {}", entry.name, entry.value);
                    }
                }
            },
            Err(e) => ctx.fail(&format!("could not list scope '{}': {}", registry.scope(), e)),
        },
    }
}
