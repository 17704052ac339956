//! Wizards: ordered input steps run as data by the engine

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use super::{CancelFn, Dialog, InputKind, MenuEngine, Reply};

/// Checks one answer; the error text is shown to the user
pub type Validator = fn(&str) -> Result<(), String>;

/// One prompt of a wizard
#[derive(Debug, Clone)]
pub struct WizardStep {
    pub prompt: String,
    pub initial: String,
    pub kind: InputKind,
    pub validator: Option<Validator>,
}

/// Ordered script of input steps
#[derive(Debug, Clone, Default)]
pub struct Wizard {
    steps: Vec<WizardStep>,
}

impl Wizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, prompt: &str, initial: &str, kind: InputKind) -> Self {
        self.steps.push(WizardStep {
            prompt: prompt.to_string(),
            initial: initial.to_string(),
            kind,
            validator: None,
        });
        self
    }

    pub fn text(self, prompt: &str, initial: &str) -> Self {
        self.step(prompt, initial, InputKind::Text)
    }

    pub fn masked(self, prompt: &str, initial: &str) -> Self {
        self.step(prompt, initial, InputKind::Masked)
    }

    pub fn numeric(self, prompt: &str, initial: &str) -> Self {
        self.step(prompt, initial, InputKind::Numeric)
    }

    /// Validate the most recently added step
    pub fn check(mut self, validator: Validator) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.validator = Some(validator);
        }
        self
    }

    pub fn steps(&self) -> &[WizardStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Stock validators
pub mod validate {
    pub fn not_empty(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            Err("Value required".to_string())
        } else {
            Ok(())
        }
    }

    /// TCP port 1-65535
    pub fn port(value: &str) -> Result<(), String> {
        match value.parse::<u16>() {
            Ok(port) if port > 0 => Ok(()),
            _ => Err("Port must be 1-65535".to_string()),
        }
    }
}

type CompleteFn<C> = Box<dyn FnOnce(&mut MenuEngine<C>, &mut C, Vec<String>)>;

struct WizardRun<C> {
    steps: Vec<WizardStep>,
    answers: Vec<String>,
    on_complete: CompleteFn<C>,
    on_cancel: CancelFn<C>,
}

/// Taken by whichever continuation finishes the run
type SharedRun<C> = Rc<RefCell<Option<WizardRun<C>>>>;

enum Verdict {
    Next,
    Done,
    Rejected(String),
}

impl<C: 'static> MenuEngine<C> {
    /// Prompt each step in order, then hand every answer to `on_complete`.
    /// Esc at any step abandons the run and calls `on_cancel`.
    pub fn run_wizard<F, G>(&mut self, wizard: Wizard, on_complete: F, on_cancel: G)
    where
        F: FnOnce(&mut MenuEngine<C>, &mut C, Vec<String>) + 'static,
        G: FnOnce(&mut MenuEngine<C>, &mut C) + 'static,
    {
        if wizard.is_empty() {
            debug!("empty wizard, nothing to prompt");
            return;
        }
        let run = WizardRun {
            steps: wizard.steps,
            answers: Vec::new(),
            on_complete: Box::new(on_complete),
            on_cancel: Box::new(on_cancel),
        };
        prompt(self, Rc::new(RefCell::new(Some(run))), None);
    }
}

fn prompt<C: 'static>(engine: &mut MenuEngine<C>, shared: SharedRun<C>, retry: Option<String>) {
    let (title, initial, kind) = {
        let guard = shared.borrow();
        let Some(step) = guard.as_ref().and_then(|run| run.steps.get(run.answers.len())) else {
            return;
        };
        (
            step.prompt.clone(),
            retry.unwrap_or_else(|| step.initial.clone()),
            step.kind,
        )
    };

    let confirm_run = Rc::clone(&shared);
    engine.push(Dialog::input(&title, &initial, kind), move |engine, ctx, reply| {
        let Reply::Text(text) = reply else {
            return;
        };
        let verdict = {
            let mut guard = confirm_run.borrow_mut();
            let Some(run) = guard.as_mut() else {
                return;
            };
            let checked = run
                .steps
                .get(run.answers.len())
                .and_then(|step| step.validator)
                .map_or(Ok(()), |check| check(&text));
            match checked {
                Ok(()) => {
                    run.answers.push(text.clone());
                    if run.answers.len() == run.steps.len() {
                        Verdict::Done
                    } else {
                        Verdict::Next
                    }
                },
                Err(reason) => Verdict::Rejected(reason),
            }
        };
        match verdict {
            Verdict::Next => prompt(engine, confirm_run, None),
            Verdict::Done => {
                let finished = confirm_run.borrow_mut().take();
                if let Some(run) = finished {
                    (run.on_complete)(engine, ctx, run.answers);
                }
            },
            Verdict::Rejected(reason) => {
                engine.message_then("Invalid", &reason, move |engine, _| {
                    prompt(engine, confirm_run, Some(text));
                });
            },
        }
    });

    engine.on_cancel(move |engine, ctx| {
        let abandoned = shared.borrow_mut().take();
        if let Some(run) = abandoned {
            (run.on_cancel)(engine, ctx);
        }
    });
}
