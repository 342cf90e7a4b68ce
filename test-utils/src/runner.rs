use crate::Journal;
use async_trait::async_trait;
use azure_chroot::util::process::{command_line, CommandOutput, CommandRunner};
use azure_chroot_shared::constants::tools;
use azure_chroot_shared::errors::ChrootResult;
use parking_lot::Mutex;
use std::collections::VecDeque;

struct Rule {
    prefix: String,
    exact: bool,
    responses: VecDeque<CommandOutput>,
}

/// Scripted [`CommandRunner`].
///
/// Commands are matched by prefix against their rendered line; shell
/// snippets (`/bin/sh -c ...`) are matched on the snippet itself. Exact
/// rules beat prefix rules, and the longest matching prefix wins. Queued
/// responses are consumed in order and the last one repeats. Unmatched
/// commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    journal: Option<Journal>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    fn add(&self, prefix: &str, exact: bool, output: CommandOutput) -> &Self {
        let mut rules = self.rules.lock();
        match rules
            .iter_mut()
            .find(|r| r.prefix == prefix && r.exact == exact)
        {
            Some(rule) => rule.responses.push_back(output),
            None => rules.push(Rule {
                prefix: prefix.to_string(),
                exact,
                responses: VecDeque::from([output]),
            }),
        }
        self
    }

    /// Queue `output` for commands starting with `prefix`.
    pub fn on(&self, prefix: &str, output: CommandOutput) -> &Self {
        self.add(prefix, false, output)
    }

    /// Queue `output` for exactly `line`.
    pub fn on_line(&self, line: &str, output: CommandOutput) -> &Self {
        self.add(line, true, output)
    }

    pub fn stdout(&self, prefix: &str, stdout: &str) -> &Self {
        self.on(prefix, CommandOutput::ok(stdout))
    }

    pub fn fail(&self, prefix: &str, stderr: &str) -> &Self {
        self.on(prefix, CommandOutput::failed(1, stderr))
    }

    /// Every command line run so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn respond(&self, line: &str) -> CommandOutput {
        let mut rules = self.rules.lock();
        let Some(rule) = rules
            .iter_mut()
            .filter(|r| {
                if r.exact {
                    line == r.prefix
                } else {
                    line.starts_with(&r.prefix)
                }
            })
            .max_by_key(|r| (r.exact, r.prefix.len()))
        else {
            return CommandOutput::ok("");
        };
        if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or_default()
        } else {
            rule.responses.front().cloned().unwrap_or_default()
        }
    }
}

fn display_line(program: &str, args: &[String]) -> String {
    match args {
        [flag, script] if program == tools::SHELL && flag == "-c" => script.clone(),
        _ => command_line(program, args),
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> ChrootResult<CommandOutput> {
        let line = display_line(program, args);
        self.calls.lock().push(line.clone());
        if let Some(journal) = &self.journal {
            journal.push(format!("run: {}", line));
        }
        Ok(self.respond(&line))
    }
}
