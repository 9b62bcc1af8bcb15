use pipeline_core::{PipelineStorage, TopicDirectory, TopicRecord};

use super::{parse_json_arg, Context};
use crate::{OutputFormat, TopicCommands};

pub(crate) async fn run(command: TopicCommands, ctx: &Context) {
    match command {
        TopicCommands::Put { topic_id, fields } => {
            let fields = match parse_json_arg(ctx, "fields", &fields) {
                serde_json::Value::Object(map) => map,
                _ => ctx.fail("--fields must be a JSON object"),
            };
            let record = TopicRecord {
                topic_id: topic_id.clone(),
                fields,
            };
            if let Err(e) = ctx.storage.put_topic(record.clone()).await {
                ctx.fail(&format!("could not store topic '{}': {}", topic_id, e));
            }
            match ctx.output {
                OutputFormat::Json => ctx.print_json(&record),
                OutputFormat::Text => {
                    if !ctx.quiet {
                        println!("stored topic {}", topic_id);
                    }
                }
            }
        }
        TopicCommands::Get { topic_id } => {
            let topics = TopicDirectory::new(ctx.storage.clone());
            match topics.get_topic(&topic_id).await {
                Ok(Some(record)) => match ctx.output {
                    OutputFormat::Json => ctx.print_json(&record),
                    OutputFormat::Text => {
                        println!("topic {}", record.topic_id);
                        for (key, value) in &record.fields {
                            println!("  {}: {}", key, value);
                        }
                    }
                },
                Ok(None) => ctx.fail(&format!("topic '{}' not found", topic_id)),
                Err(e) => ctx.fail(&format!("could not read topic '{}': {}", topic_id, e)),
            }
        }
    }
}
