use pipeline_core::ProjectStages;

use super::Context;
use crate::{OutputFormat, StagesCommands};

pub(crate) async fn run(command: StagesCommands, ctx: &Context) {
    match command {
        StagesCommands::Provision { project } => {
            let stages = project_stages(ctx, &project);
            let registry = ctx.registry();
            if let Err(e) = stages.publish_to(&registry).await {
                ctx.fail(&format!("could not publish stages of '{}': {}", project, e));
            }
            match ctx.output {
                OutputFormat::Json => ctx.print_json(&stages),
                OutputFormat::Text => {
                    if ctx.quiet {
                        return;
                    }
                    println!("project {} (scope '{}')", project, registry.scope());
                    for c in stages.containers() {
                        let grants: Vec<String> = c
                            .grants
                            .iter()
                            .map(|(principal, access)| format!("{}={}", principal, access.as_str()))
                            .collect();
                        println!(
                            "  {:<8} {:<40} {}",
                            c.stage.as_str(),
                            c.container_name,
                            grants.join(" ")
                        );
                    }
                }
            }
        }
        StagesCommands::Check {
            project,
            principal,
            from,
            to,
        } => {
            let stages = project_stages(ctx, &project);
            if let Err(e) = stages.authorize_transfer(&principal, from, to) {
                ctx.fail(&format!("denied: {}", e));
            }
            match ctx.output {
                OutputFormat::Json => ctx.print_json(&serde_json::json!({
                    "project": project,
                    "principal": principal,
                    "from": from,
                    "to": to,
                    "allowed": true,
                })),
                OutputFormat::Text => {
                    if !ctx.quiet {
                        println!("allowed: {} may move {} -> {}", principal, from, to);
                    }
                }
            }
        }
    }
}

fn project_stages(ctx: &Context, project: &str) -> ProjectStages {
    match ctx.config.project_stages(project) {
        Ok(stages) => stages,
        Err(e) => ctx.fail(&format!("invalid grants for '{}': {}", project, e)),
    }
}
