/// Running transcript of one capture session.
///
/// Final fragments are appended as-is; the interim fragment is the
/// recognizer's current guess for the tail and is replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptState {
    pub final_text: String,
    pub interim_text: String,
}

impl TranscriptState {
    pub fn apply(&mut self, transcript: &str, is_final: bool) {
        if is_final {
            self.final_text.push_str(transcript);
            self.interim_text.clear();
        } else {
            self.interim_text.clear();
            self.interim_text.push_str(transcript);
        }
    }

    pub fn clear_interim(&mut self) {
        self.interim_text.clear();
    }

    pub fn reset(&mut self) {
        self.final_text.clear();
        self.interim_text.clear();
    }

    /// Final text followed by the pending interim guess.
    pub fn display_text(&self) -> String {
        format!("{}{}", self.final_text, self.interim_text)
    }
}
