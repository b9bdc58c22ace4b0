/// Yes/no prompt shown before destructive actions.
pub trait Confirmer {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Answers every prompt with a fixed reply.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirmer for FixedAnswer {
    fn confirm(&mut self, _prompt: &str) -> bool {
        self.0
    }
}
