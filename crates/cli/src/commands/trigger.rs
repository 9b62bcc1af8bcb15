use std::sync::Arc;

use pipeline_core::{CompletionEvent, StaticExecutionService, TriggerEngine, TriggerOutcome};

use super::Context;
use crate::outbox::CrawlOutbox;
use crate::{OutputFormat, TriggerCommands};

pub(crate) async fn run(command: TriggerCommands, ctx: &Context) {
    match command {
        TriggerCommands::Fire {
            trigger,
            unit,
            run_id,
            state,
            observed,
            deduplicate,
        } => {
            let Some((definition, configured_dedup)) = ctx.config.trigger(&trigger) else {
                ctx.fail(&format!("trigger '{}' is not configured", trigger));
            };

            let execution = StaticExecutionService::new();
            for (other, other_state) in &observed {
                execution.set_state(other, *other_state);
            }
            let mut engine = TriggerEngine::new(
                ctx.storage.clone(),
                ctx.registry(),
                Arc::new(execution),
                Arc::new(CrawlOutbox::new(&ctx.state_dir)),
            );
            if deduplicate || configured_dedup {
                engine = engine.with_deduplication();
            }

            let event = CompletionEvent {
                unit,
                run_id,
                state,
            };
            match engine.on_completion(&definition, &event).await {
                Ok(outcome) => print_trigger_outcome(ctx, &outcome),
                Err(e) => ctx.fail(&e.to_string()),
            }
        }
    }
}

fn print_trigger_outcome(ctx: &Context, outcome: &TriggerOutcome) {
    if ctx.output == OutputFormat::Json {
        ctx.print_json(outcome);
        return;
    }
    if ctx.quiet {
        return;
    }
    match outcome {
        TriggerOutcome::Triggered(run) => {
            println!(
                "started crawl {} ({} over {})",
                run.crawl_run_id, run.crawler, run.target
            );
        }
        TriggerOutcome::Waiting { unmet } => {
            for u in unmet {
                println!("waiting: {} is {} (needs {})", u.unit, u.observed, u.expected);
            }
        }
        TriggerOutcome::Duplicate {
            upstream_run_id,
            crawl_run_id,
        } => {
            println!(
                "already fired for upstream run {} (crawl {})",
                upstream_run_id,
                crawl_run_id.as_deref().unwrap_or("in flight")
            );
        }
    }
}
