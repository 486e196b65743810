//! Built-in scenarios for the LogScale sample app

use futures::future::{BoxFuture, FutureExt};

use foundry_common::{log_context, Record};

use crate::error::E2eResult;
use crate::page::PageObject;
use crate::runner::{Scenario, ScenarioContext};

pub const INGESTION_SUITE: &str = "LogScale Data Ingestion";
pub const WORKFLOW_SUITE: &str = "LogScale Workflow";

/// Every scenario, in the order they run
pub fn foundry_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "should navigate to LogScale app",
            suite: INGESTION_SUITE,
            tags: &["ingestion", "smoke"],
            run: navigate_to_app,
        },
        Scenario {
            name: "should fill form with test data and submit successfully",
            suite: INGESTION_SUITE,
            tags: &["ingestion", "convergence"],
            run: submit_and_verify_visible,
        },
        Scenario {
            name: "should use Fill with Test Data button and submit",
            suite: INGESTION_SUITE,
            tags: &["ingestion"],
            run: fill_with_test_data,
        },
        Scenario {
            name: "should execute Ingest Data to LogScale workflow",
            suite: WORKFLOW_SUITE,
            tags: &["workflow", "convergence"],
            run: execute_workflow,
        },
    ]
}

fn navigate_to_app(ctx: &ScenarioContext) -> BoxFuture<'_, E2eResult<()>> {
    async move { ctx.ingestion.navigate().await }.boxed()
}

fn submit_and_verify_visible(ctx: &ScenarioContext) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        let record = Record::e2e_sample();
        ctx.ingestion.navigate().await?;
        ctx.ingestion.submit(&record).await?;
        ctx.ingestion.verify_visible(&record).await?;
        Ok(())
    }
    .boxed()
}

fn fill_with_test_data(ctx: &ScenarioContext) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        ctx.ingestion.navigate().await?;
        ctx.ingestion.click_fill_with_test_data().await?;
        ctx.ingestion.submit_form().await?;
        ctx.ingestion.wait_for_ingestion_success().await
    }
    .boxed()
}

fn execute_workflow(ctx: &ScenarioContext) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        let name = ctx.config.workflow_name.as_str();
        ctx.workflows.navigate().await?;
        ctx.workflows.verify_workflow_exists(name).await?;
        let report = ctx.workflows.execute_and_verify_workflow(name, None).await?;
        ctx.logger.info(
            &format!("Workflow '{}' reached {}", report.workflow, report.status),
            log_context!("attempts" => report.attempts, "elapsed_ms" => report.elapsed_ms),
        );
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_scenario_names_are_unique() {
        let scenarios = foundry_scenarios();
        let names: HashSet<_> = scenarios.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), scenarios.len());
    }

    #[test]
    fn test_convergence_tag_selects_both_polls() {
        let tagged: Vec<_> = foundry_scenarios()
            .into_iter()
            .filter(|s| s.has_tag("convergence"))
            .map(|s| s.suite)
            .collect();
        assert_eq!(tagged, vec![INGESTION_SUITE, WORKFLOW_SUITE]);
    }
}
