use super::backend::{TextModel, Token};
use anyhow::Result;

/// Incremental detokenizer.
///
/// Tokens are decoded in a sliding window so multi-token characters and
/// merge-dependent whitespace come out right; a fragment is released only
/// once it no longer ends in an incomplete UTF-8 sequence.
#[derive(Debug, Default)]
pub struct TokenStream {
    tokens: Vec<Token>,
    prev_index: usize,
    current_index: usize,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `token` and returns any newly completed text
    pub fn push(&mut self, model: &dyn TextModel, token: Token) -> Result<Option<String>> {
        let prev_text = model.detokenize(&self.tokens[self.prev_index..self.current_index])?;
        self.tokens.push(token);
        let text = model.detokenize(&self.tokens[self.prev_index..])?;

        if text.len() > prev_text.len() && !text.ends_with('\u{FFFD}') {
            let fresh = match text.strip_prefix(prev_text.as_str()) {
                Some(rest) => rest.to_string(),
                None => text.get(prev_text.len()..).unwrap_or_default().to_string(),
            };
            self.prev_index = self.current_index;
            self.current_index = self.tokens.len();
            Ok(Some(fresh))
        } else {
            Ok(None)
        }
    }

    /// Text for tokens not released yet
    pub fn flush(&mut self, model: &dyn TextModel) -> Result<Option<String>> {
        let prev_text = model.detokenize(&self.tokens[self.prev_index..self.current_index])?;
        let text = model.detokenize(&self.tokens[self.prev_index..])?;
        self.prev_index = self.current_index;
        self.current_index = self.tokens.len();
        if text.len() > prev_text.len() {
            Ok(text.get(prev_text.len()..).map(str::to_string))
        } else {
            Ok(None)
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::mock::ScriptedTextModel;

    #[test]
    fn test_pieces_concatenate_to_full_decode() {
        let model = ScriptedTextModel::new();
        let tokens = model.tokenize("hello world", false, false).unwrap();
        let mut stream = TokenStream::new();
        let mut out = String::new();
        for &token in &tokens {
            if let Some(piece) = stream.push(&model, token).unwrap() {
                out.push_str(&piece);
            }
        }
        if let Some(rest) = stream.flush(&model).unwrap() {
            out.push_str(&rest);
        }
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_incomplete_utf8_is_held() {
        let model = ScriptedTextModel::new();
        // "é" is two bytes, two byte tokens
        let tokens = model.tokenize("é", false, false).unwrap();
        assert_eq!(tokens.len(), 2);
        let mut stream = TokenStream::new();
        assert_eq!(stream.push(&model, tokens[0]).unwrap(), None);
        assert_eq!(stream.push(&model, tokens[1]).unwrap().as_deref(), Some("é"));
    }
}
