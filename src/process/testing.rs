//! Scripted command runner for unit tests

use crate::process::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::sync::Mutex;

/// Answers commands from a script keyed by a prefix of the rendered command line
#[derive(Default)]
pub struct ScriptedRunner {
    script: Vec<(String, Result<CommandOutput, String>)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit 0 with `stdout` for commands starting with `prefix`
    pub fn ok(mut self, prefix: &str, stdout: &str) -> Self {
        self.script.push((
            prefix.to_string(),
            Ok(CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        ));
        self
    }

    /// Exit `code` with `stderr` for commands starting with `prefix`
    pub fn fail(mut self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.script.push((
            prefix.to_string(),
            Ok(CommandOutput {
                exit_code: code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
        ));
        self
    }

    /// Spawn failure for commands starting with `prefix`
    pub fn spawn_error(mut self, prefix: &str, message: &str) -> Self {
        self.script.push((prefix.to_string(), Err(message.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|spec| spec.to_string())
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(spec.clone());
        let line = spec.to_string();
        match self.script.iter().find(|(prefix, _)| line.starts_with(prefix.as_str())) {
            Some((_, Ok(output))) => Ok(output.clone()),
            Some((_, Err(message))) => Err(CommandError::Spawn {
                program: spec.program.clone(),
                message: message.clone(),
            }),
            None => Ok(CommandOutput::default()),
        }
    }
}
