//! Reference driver loop
//!
//! The engine never blocks; this loop does. It runs the state to its next
//! pause, performs whatever I/O the pause asks for (provider request,
//! tool round, user prompt, host evaluation), and resumes, until the run
//! reaches a terminal status. Embedders with their own scheduling
//! (queues, persistence between pauses) use the same building blocks.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use super::protocol::build_request;
use super::provider::AiProvider;
use super::retry::{with_retry, RetryPolicy};
use super::tools::ToolRegistry;
use crate::executor::types::{PendingRequest, Val};
use crate::executor::{run_until_pause, Vm};
use crate::module::CodeParser;
use crate::types::{AiOpKind, RunStatus};

/// Source of human input for `ask` operations
#[async_trait]
pub trait UserInputSource: Send + Sync {
    async fn read(&self, prompt: &str) -> std::result::Result<String, String>;
}

/// Sandbox that evaluates host-language code for `HostEval` suspensions
#[async_trait]
pub trait HostEvaluator: Send + Sync {
    async fn eval(
        &self,
        params: &[String],
        body: &str,
        args: &[Val],
    ) -> std::result::Result<Val, String>;
}

/// Wires a provider, tool registry, and parser into a run loop
pub struct Driver<'a> {
    provider: &'a dyn AiProvider,
    tools: &'a ToolRegistry,
    parser: &'a dyn CodeParser,
    user_input: Option<&'a dyn UserInputSource>,
    host: Option<&'a dyn HostEvaluator>,
    retry: RetryPolicy,
}

impl<'a> Driver<'a> {
    pub fn new(
        provider: &'a dyn AiProvider,
        tools: &'a ToolRegistry,
        parser: &'a dyn CodeParser,
    ) -> Self {
        Self {
            provider,
            tools,
            parser,
            user_input: None,
            host: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_user_input(mut self, source: &'a dyn UserInputSource) -> Self {
        self.user_input = Some(source);
        self
    }

    pub fn with_host(mut self, host: &'a dyn HostEvaluator) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Drive the state to `Completed` or `Error`
    pub async fn drive_to_completion(&self, vm: &mut Vm) -> Result<RunStatus> {
        loop {
            run_until_pause(vm);

            match vm.status {
                RunStatus::Completed | RunStatus::Error => {
                    info!(status = ?vm.status, "run finished");
                    return Ok(vm.status);
                }

                RunStatus::AwaitingAi => self.handle_ai(vm).await?,

                RunStatus::AwaitingToolEval => {
                    let calls = match &vm.pending {
                        Some(PendingRequest::ToolEval { calls, .. }) => calls.clone(),
                        other => return Err(anyhow!("awaiting tools without calls: {:?}", other)),
                    };
                    debug!(count = calls.len(), "executing tool round");
                    let results = self.tools.execute_round(&calls).await;
                    vm.resume_with_tool_results(results)?;
                }

                RunStatus::AwaitingUser => {
                    let prompt = match &vm.pending {
                        Some(PendingRequest::Ai { request }) => request.prompt.clone(),
                        other => return Err(anyhow!("awaiting user without an ask: {:?}", other)),
                    };
                    let source = self
                        .user_input
                        .ok_or_else(|| anyhow!("program asked for user input but the driver has no input source"))?;
                    let input = source
                        .read(&prompt)
                        .await
                        .map_err(|e| anyhow!("user input failed: {}", e))?;
                    vm.resume_with_user_input(&input)?;
                }

                RunStatus::AwaitingHostEval => {
                    let (params, body, args) = match &vm.pending {
                        Some(PendingRequest::HostEval { params, body, args }) => {
                            (params.clone(), body.clone(), args.clone())
                        }
                        other => return Err(anyhow!("awaiting host eval without one: {:?}", other)),
                    };
                    let host = self
                        .host
                        .ok_or_else(|| anyhow!("program called host code but the driver has no host evaluator"))?;
                    let value = host
                        .eval(&params, &body, &args)
                        .await
                        .map_err(|e| anyhow!("host evaluation failed: {}", e))?;
                    vm.resume_with_host_result(value)?;
                }

                RunStatus::Running => unreachable!("run_until_pause returned while running"),
            }
        }
    }

    async fn handle_ai(&self, vm: &mut Vm) -> Result<()> {
        let request = build_request(vm, Some(self.tools)).context("building AI request")?;
        let kind = request.operation;
        debug!(op = %kind, round = request.history.len() + 1, "sending AI request");

        // Plain vibe goes through the provider's code mode; tool-enabled
        // vibe shares the conversation machinery with tool-enabled do
        if kind == AiOpKind::Vibe && request.tools.is_empty() {
            let code = with_retry(&self.retry, || self.provider.generate_code(&request)).await?;
            vm.resume_with_generated_code(&code, self.parser)?;
            return Ok(());
        }

        let response = with_retry(&self.retry, || self.provider.execute(&request)).await?;

        if kind == AiOpKind::Vibe {
            let at_cap = matches!(
                &vm.pending,
                Some(PendingRequest::Ai { request }) if request.current_round() >= request.max_rounds
            );
            if response.tool_calls.is_empty() || at_cap {
                vm.resume_with_generated_code(&response.content, self.parser)?;
                return Ok(());
            }
        }

        vm.resume_with_ai_response(response)?;
        Ok(())
    }
}
