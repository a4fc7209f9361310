// ABOUTME: Scripted fake CommandRunner for pipeline tests.
// ABOUTME: Matches commands by prefix, replays canned outputs, and records every invocation.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kmodeploy::host::{CommandRunner, ExecError, ExecOutput};

type Effect = Box<dyn Fn(&[&str]) + Send + Sync>;

struct Script {
    prefix: String,
    outputs: VecDeque<ExecOutput>,
    effect: Option<Effect>,
}

#[derive(Default)]
struct Inner {
    scripts: Vec<Script>,
    calls: Vec<String>,
}

/// Fake host: every command succeeds with empty output unless a script says
/// otherwise. Scripts match on a prefix of `"<program> <args...>"`; the most
/// recently registered match wins, so tests can override the healthy
/// defaults. A multi-output script replays its outputs in order and then
/// repeats the last one.
#[derive(Clone, Default)]
pub struct FakeRunner {
    inner: Arc<Mutex<Inner>>,
}

pub fn ok(stdout: &str) -> ExecOutput {
    ExecOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn fail(stderr: &str) -> ExecOutput {
    ExecOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a fixed response for commands starting with `prefix`.
    pub fn on(&self, prefix: &str, output: ExecOutput) -> &Self {
        self.on_seq(prefix, vec![output])
    }

    /// Script a sequence of responses (last one repeats).
    pub fn on_seq(&self, prefix: &str, outputs: Vec<ExecOutput>) -> &Self {
        self.inner.lock().unwrap().scripts.insert(
            0,
            Script {
                prefix: prefix.to_string(),
                outputs: outputs.into(),
                effect: None,
            },
        );
        self
    }

    /// Script a response plus a side effect receiving the full arg list
    /// (used to materialize files a real command would have produced).
    pub fn on_with_effect(
        &self,
        prefix: &str,
        output: ExecOutput,
        effect: impl Fn(&[&str]) + Send + Sync + 'static,
    ) -> &Self {
        self.inner.lock().unwrap().scripts.insert(
            0,
            Script {
                prefix: prefix.to_string(),
                outputs: vec![output].into(),
                effect: Some(Box::new(effect)),
            },
        );
        self
    }

    /// Every command line seen so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn respond(&self, program: &str, args: &[&str]) -> ExecOutput {
        let line = if args.is_empty() {
            program.to_string()
        } else {
            format!("{program} {}", args.join(" "))
        };

        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(line.clone());

        for script in &mut inner.scripts {
            if line.starts_with(&script.prefix) {
                let output = if script.outputs.len() > 1 {
                    script.outputs.pop_front().unwrap()
                } else {
                    script.outputs.front().cloned().unwrap_or_else(|| ok(""))
                };
                if let Some(effect) = &script.effect {
                    effect(args);
                }
                return output;
            }
        }
        ok("")
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput, ExecError> {
        Ok(self.respond(program, args))
    }

    async fn run_in(
        &self,
        _dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput, ExecError> {
        Ok(self.respond(program, args))
    }
}

/// A runner scripted for a fully healthy host: valid platform, no prior
/// driver install, clone materializes a DKMS-ready source tree, and the
/// module shows up in lsmod once modprobe has run.
pub fn healthy_runner() -> FakeRunner {
    let runner = FakeRunner::new();
    runner
        .on("uname -r", ok("6.8.0-45-generic"))
        .on("uname -m", ok("x86_64"))
        .on("mokutil --sb-state", ok("SecureBoot disabled\n"))
        .on("modinfo -n", fail("modinfo: ERROR: Module 8812au not found."))
        .on("dkms status", ok(""))
        .on_with_effect("git clone", ok(""), |args| {
            // Last arg is the clone target; give it a buildable tree.
            if let Some(target) = args.last() {
                let dir = std::path::Path::new(target);
                std::fs::create_dir_all(dir).unwrap();
                std::fs::write(dir.join("Makefile"), "all:\n\ttrue\n").unwrap();
                std::fs::write(dir.join("dkms.conf"), "PACKAGE_NAME=rtl8812au\n").unwrap();
            }
        })
        .on_seq(
            "lsmod",
            vec![
                ok("Module                  Size  Used by\n"),
                ok("Module                  Size  Used by\n8812au  1105920  0\n"),
            ],
        )
        .on("ls /sys/class/net", ok("lo\nwlan0\n"));
    runner
}
