//! Prompt Construction
//!
//! System prompts for the planning decision, plan generation, step
//! execution, and final synthesis. Kept in one place so the JSON shapes the
//! parsers expect stay next to the instructions that produce them.

use tabletalk_core::{ActiveFilters, ColumnProfile, DatasetDescriptor, FilterValue, PlanStep};
use tabletalk_llm::ToolDefinition;

fn dataset_list(datasets: &[DatasetDescriptor]) -> String {
    if datasets.is_empty() {
        "(no datasets selected)".to_string()
    } else {
        datasets
            .iter()
            .map(|d| format!("- {} (id: {})", d.name, d.id))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// System prompt for the one-shot planning classification.
pub fn planning_decision_system(datasets: &[DatasetDescriptor]) -> String {
    format!(
        "You are a data analysis assistant deciding how to answer the user's \
         latest question about their selected datasets.\n\n\
         Selected datasets:\n{}\n\n\
         Decide whether answering requires a multi-step plan (several distinct \
         queries, computations, or charts that build on each other) or can be \
         answered directly in a single response.\n\n\
         Respond with ONLY a JSON object, no other text:\n\
         {{\"requiresPlanning\": true or false, \"reasoning\": \"one or two \
         sentences explaining the decision\"}}",
        dataset_list(datasets)
    )
}

/// System prompt for plan generation, listing every available tool.
pub fn plan_generation_system(
    datasets: &[DatasetDescriptor],
    tools: &[ToolDefinition],
) -> String {
    let tool_catalog = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a data analysis assistant creating a step-by-step plan to \
         answer the user's question about their selected datasets.\n\n\
         Selected datasets:\n{}\n\n\
         Available tools:\n{}\n\n\
         Produce 2 to 5 steps. Each step has a short task name, concrete \
         instructions, optional extra context, and the subset of tool names \
         that step may use. Assign a chart tool to a step only when that step \
         should display a chart. Later steps can rely on the results of \
         earlier ones.\n\n\
         Respond with ONLY a JSON object, no other text:\n\
         {{\"steps\": [{{\"task\": \"...\", \"instructions\": \"...\", \
         \"context\": \"optional\", \"tools\": [\"tool_name\"]}}]}}",
        dataset_list(datasets),
        tool_catalog
    )
}

/// System prompt for the direct-response path: one streamed exchange with
/// the full tool set and no plan.
pub fn direct_response_system(datasets: &[DatasetDescriptor]) -> String {
    format!(
        "You are a data analysis assistant answering the user's question about \
         their selected datasets. Use the available tools when you need data, \
         then answer directly and conversationally. Do not invent numbers.\n\n\
         Selected datasets:\n{}",
        dataset_list(datasets)
    )
}

/// System prompt for executing one plan step.
pub fn step_system(step_index: usize, step_count: usize) -> String {
    format!(
        "You are a data analysis assistant executing step {} of {} of an \
         agreed plan. Work only on this step's task using the tools you have \
         been given; earlier steps' results are already in the conversation. \
         Do not attempt later steps and do not write a final answer yet. When \
         the step's work is done, reply with a brief note of what you found.",
        step_index + 1,
        step_count
    )
}

/// The user-role message that frames one step for the model.
pub fn step_task_message(step: &PlanStep) -> String {
    let mut text = format!(
        "Current step: {}\nInstructions: {}",
        step.task, step.instructions
    );
    if let Some(context) = &step.context {
        text.push_str("\nContext: ");
        text.push_str(context);
    }
    text
}

fn render_filters(filters: &ActiveFilters) -> String {
    if filters.is_empty() {
        return "(none)".to_string();
    }
    filters
        .iter()
        .map(|(column, value)| match value {
            FilterValue::Values { values } => {
                format!("- {}: one of [{}]", column, values.join(", "))
            }
            FilterValue::DateRange { start, end } => {
                format!("- {}: between {} and {}", column, start, end)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_profiles(profiles: &[(String, Vec<ColumnProfile>)]) -> String {
    if profiles.is_empty() {
        return "(no column metadata available)".to_string();
    }
    let mut out = String::new();
    for (dataset, columns) in profiles {
        out.push_str(&format!("Dataset {}:\n", dataset));
        for column in columns {
            out.push_str(&format!(
                "  - {} ({}, {:.0}% null, {} distinct)",
                column.name,
                column.inferred_type,
                column.null_ratio * 100.0,
                column.unique_values
            ));
            if !column.sample_values.is_empty() {
                out.push_str(&format!(" e.g. {}", column.sample_values.join(", ")));
            }
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

/// System prompt for the final synthesis call. No tools are offered; the
/// model composes an answer from the accumulated conversation.
pub fn synthesis_system(
    datasets: &[DatasetDescriptor],
    filters: &ActiveFilters,
    profiles: &[(String, Vec<ColumnProfile>)],
) -> String {
    format!(
        "You are a data analysis assistant writing the final answer to the \
         user's question. All queries, computations, and charts are already \
         done and their results are in the conversation above. Compose a \
         clear, conversational answer grounded in those results. Refer to any \
         charts that were rendered instead of repeating their data. Do not \
         invent numbers.\n\n\
         Selected datasets:\n{}\n\n\
         Active filters the user has applied:\n{}\n\n\
         Column metadata:\n{}",
        dataset_list(datasets),
        render_filters(filters),
        render_profiles(profiles)
    )
}
