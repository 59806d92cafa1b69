use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

type ArgsMatcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;
type SideEffect = Box<dyn Fn(&ProcessCommand) + Send + Sync>;

/// Scripted [`ProcessRunner`] standing in for the launcher in tests.
///
/// Each call is answered by the first scripted response whose program and
/// argument matcher accept it; clones share the script and the call log.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    responses: Vec<ScriptedResponse>,
    calls: Vec<ProcessCommand>,
}

struct ScriptedResponse {
    program: String,
    args_matcher: Option<ArgsMatcher>,
    side_effect: Option<SideEffect>,
    output: ProcessOutput,
}

impl ScriptedResponse {
    fn accepts(&self, command: &ProcessCommand) -> bool {
        self.program == command.program
            && self
                .args_matcher
                .as_ref()
                .map_or(true, |matches| matches(&command.args))
    }
}

/// One response being scripted; takes effect on [`MockCommandConfig::finish`]
pub struct MockCommandConfig {
    runner: MockProcessRunner,
    response: ScriptedResponse,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Script a response to `program`; it succeeds silently unless configured
    pub fn expect_command(&mut self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            response: ScriptedResponse {
                program: program.to_string(),
                args_matcher: None,
                side_effect: None,
                output: ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::from_millis(10),
                },
            },
        }
    }

    /// Every command run so far, in call order
    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let mut state = self.state();
        state.calls.push(command.clone());

        let response = state
            .responses
            .iter()
            .find(|response| response.accepts(&command))
            .ok_or_else(|| ProcessError::Unexpected(command.to_string()))?;
        if let Some(effect) = &response.side_effect {
            effect(&command);
        }
        Ok(response.output.clone())
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.response.args_matcher = Some(Box::new(matcher));
        self
    }

    /// Run `effect` whenever this response is chosen, e.g. to write the
    /// output files a real executable would leave behind
    pub fn on_call<F>(mut self, effect: F) -> Self
    where
        F: Fn(&ProcessCommand) + Send + Sync + 'static,
    {
        self.response.side_effect = Some(Box::new(effect));
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.response.output.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.response.output.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    pub fn finish(self) {
        self.runner.state().responses.push(self.response);
    }
}
