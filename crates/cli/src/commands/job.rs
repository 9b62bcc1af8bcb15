use pipeline_core::JobRecord;

use super::{parse_json_arg, Context};
use crate::{JobCommands, OutputFormat};

pub(crate) async fn run(command: JobCommands, ctx: &Context) {
    match command {
        JobCommands::Update {
            job_id,
            project,
            state,
            response,
        } => {
            let response = match response {
                Some(raw) => parse_json_arg(ctx, "response", &raw),
                None => serde_json::Value::Null,
            };
            let outcome = ctx
                .jobs()
                .update_job_status(&job_id, &project, response, state)
                .await;
            ctx.print_outcome(&outcome, &format!("{} ({}) {}", job_id, project, state));
        }
        JobCommands::Get { job_id, project } => {
            match ctx.jobs().get_job(&job_id, &project).await {
                Ok(Some(record)) => print_job(ctx, &record),
                Ok(None) => ctx.fail(&format!("job '{}' not found in project '{}'", job_id, project)),
                Err(e) => ctx.fail(&format!("could not read job '{}': {}", job_id, e)),
            }
        }
        JobCommands::List { project, state } => match ctx.jobs().list_jobs(&project, state).await {
            Ok(records) => match ctx.output {
                OutputFormat::Json => ctx.print_json(&records),
                OutputFormat::Text => {
                    if records.is_empty() && !ctx.quiet {
                        println!("no jobs");
                    }
                    for r in &records {
                        println!("{:<24} {}", r.job_id, r.job_state);
                    }
                }
            },
            Err(e) => ctx.fail(&format!("could not list jobs of '{}': {}", project, e)),
        },
    }
}

fn print_job(ctx: &Context, record: &JobRecord) {
    match ctx.output {
        OutputFormat::Json => ctx.print_json(record),
        OutputFormat::Text => {
            println!("job {} ({})", record.job_id, record.project);
            println!("  state:    {}", record.job_state);
            println!("  response: {}", record.full_response);
        }
    }
}
