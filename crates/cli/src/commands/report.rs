use pipeline_core::{ReportAccumulator, ReportRecord};

use super::Context;
use crate::{OutputFormat, ReportCommands};

pub(crate) async fn run(command: ReportCommands, ctx: &Context) {
    match command {
        ReportCommands::Append {
            correlation_id,
            report_type,
            files,
            status,
            subject,
        } => {
            let outcome = ctx
                .reports()
                .append_report_result(&correlation_id, &report_type, files, status, &subject)
                .await;
            ctx.print_outcome(
                &outcome,
                &format!("report {} ({}) {}", correlation_id, report_type, status),
            );
        }
        ReportCommands::AddPart {
            correlation_id,
            report_type,
            files,
            expected,
            subject,
        } => {
            let acc = ReportAccumulator::new(ctx.reports(), &correlation_id, &report_type, expected);
            let outcome = acc.add_part(files, &subject).await;
            let status = outcome
                .record()
                .map(|r| r.status.to_string())
                .unwrap_or_else(|| "part".to_string());
            ctx.print_outcome(
                &outcome,
                &format!("report {} ({}) {}", correlation_id, report_type, status),
            );
        }
        ReportCommands::Get {
            correlation_id,
            report_type,
        } => match ctx.reports().get_report(&correlation_id, &report_type).await {
            Ok(Some(record)) => print_report(ctx, &record),
            Ok(None) => ctx.fail(&format!(
                "report '{}' ({}) not found",
                correlation_id, report_type
            )),
            Err(e) => ctx.fail(&format!("could not read report '{}': {}", correlation_id, e)),
        },
    }
}

fn print_report(ctx: &Context, record: &ReportRecord) {
    match ctx.output {
        OutputFormat::Json => ctx.print_json(record),
        OutputFormat::Text => {
            println!("report {} ({})", record.correlation_id, record.report_type);
            println!("  status:  {}", record.status);
            println!("  subject: {}", record.email_subject);
            for file in &record.output_file_list {
                println!("  file:    {}", file);
            }
        }
    }
}
