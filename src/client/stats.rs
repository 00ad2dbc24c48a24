/// Token usage reported by the server over the life of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    total_tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_usage(&mut self, total_tokens: u32, input_tokens: u32, output_tokens: u32) {
        self.total_tokens += total_tokens as u64;
        self.input_tokens += input_tokens as u64;
        self.output_tokens += output_tokens as u64;
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }
}
