//! Command-line tokenization and keyword dispatch.

use tracing::{debug, warn};

use crate::error::CommandError;

/// Characters that separate tokens on a command line.
pub const TOKEN_DELIMITERS: &[char] = &[' ', '\t', ',', ';', '\r', '\n'];

/// Splits `line` into at most `max_tokens` tokens.
///
/// Runs of delimiters collapse. A blank line yields a single empty token so
/// callers can treat it as "no command".
#[must_use]
pub fn tokenize(line: &str, max_tokens: usize) -> Vec<String> {
    let mut tokens: Vec<String> = line
        .split(TOKEN_DELIMITERS)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect();
    if tokens.is_empty() {
        return vec![String::new()];
    }
    if tokens.len() > max_tokens {
        warn!(
            count = tokens.len(),
            max_tokens, "command line truncated"
        );
        tokens.truncate(max_tokens);
    }
    tokens
}

/// Lowercases every token, unless the command is a yank whose file name
/// must keep its case.
#[must_use]
pub fn normalize(mut tokens: Vec<String>) -> Vec<String> {
    let keep_case = tokens.first().is_some_and(|first| first.starts_with('y'));
    if !keep_case {
        for token in &mut tokens {
            token.make_ascii_lowercase();
        }
    }
    tokens
}

/// Handler invoked with the full token list, keyword included.
pub type CommandHandler<C> = fn(&mut C, &[String]) -> Result<(), CommandError>;

/// One keyword binding.
pub struct CommandTableEntry<C> {
    /// Exact, case-sensitive keyword.
    pub keyword: &'static str,
    /// One-line description for `h`.
    pub summary: &'static str,
    /// Handler.
    pub handler: CommandHandler<C>,
}

/// Static keyword table over a context type `C`.
pub struct CommandTable<C: 'static> {
    entries: &'static [CommandTableEntry<C>],
}

impl<C: 'static> CommandTable<C> {
    /// Wraps a static entry list.
    #[must_use]
    pub const fn new(entries: &'static [CommandTableEntry<C>]) -> Self {
        Self { entries }
    }

    /// Entry bound to `keyword`.
    #[must_use]
    pub fn lookup(&self, keyword: &str) -> Option<&'static CommandTableEntry<C>> {
        self.entries.iter().find(|entry| entry.keyword == keyword)
    }

    /// All entries in table order.
    #[must_use]
    pub const fn entries(&self) -> &'static [CommandTableEntry<C>] {
        self.entries
    }

    /// Runs the handler bound to the first token.
    ///
    /// # Errors
    ///
    /// [`CommandError::NoSuchCommand`] for an unknown keyword, otherwise
    /// whatever the handler returns.
    pub fn dispatch(&self, ctx: &mut C, tokens: &[String]) -> Result<(), CommandError> {
        let Some(keyword) = tokens.first().filter(|keyword| !keyword.is_empty()) else {
            return Ok(());
        };
        let entry = self
            .lookup(keyword)
            .ok_or_else(|| CommandError::NoSuchCommand(keyword.clone()))?;
        debug!(keyword = entry.keyword, args = tokens.len() - 1, "dispatch");
        (entry.handler)(ctx, tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("d 0x1000i 0x1010i", &["d", "0x1000i", "0x1010i"])]
    #[case("  b\t100 ,, 3;", &["b", "100", "3"])]
    #[case("add gr1,gr2,gr3\r\n", &["add", "gr1", "gr2", "gr3"])]
    #[case("", &[""])]
    #[case(" ,;\t ", &[""])]
    fn splits_on_delimiters(#[case] line: &str, #[case] expected: &[&str]) {
        assert_eq!(tokenize(line, 25), expected);
    }

    #[test]
    fn caps_token_count() {
        assert_eq!(tokenize("a b c d e", 3), ["a", "b", "c"]);
    }

    #[test]
    fn normalize_lowercases_except_yank() {
        let tokens = normalize(tokenize("D 0X10I", 25));
        assert_eq!(tokens, ["d", "0x10i"]);
        let tokens = normalize(tokenize("y Image.BIN 0x100", 25));
        assert_eq!(tokens, ["y", "Image.BIN", "0x100"]);
    }

    struct Counter {
        calls: Vec<usize>,
    }

    fn record(ctx: &mut Counter, tokens: &[String]) -> Result<(), CommandError> {
        ctx.calls.push(tokens.len());
        Ok(())
    }

    fn refuse(_: &mut Counter, _: &[String]) -> Result<(), CommandError> {
        Err(CommandError::Syntax)
    }

    static ENTRIES: &[CommandTableEntry<Counter>] = &[
        CommandTableEntry {
            keyword: "go",
            summary: "record",
            handler: record,
        },
        CommandTableEntry {
            keyword: "no",
            summary: "refuse",
            handler: refuse,
        },
    ];

    #[test]
    fn dispatch_routes_by_exact_keyword() {
        let table = CommandTable::new(ENTRIES);
        let mut ctx = Counter { calls: Vec::new() };
        table
            .dispatch(&mut ctx, &tokenize("go 1 2", 25))
            .expect("known keyword");
        assert_eq!(ctx.calls, [3]);
        assert!(matches!(
            table.dispatch(&mut ctx, &["GO".to_owned()]),
            Err(CommandError::NoSuchCommand(keyword)) if keyword == "GO"
        ));
        assert!(matches!(
            table.dispatch(&mut ctx, &["no".to_owned()]),
            Err(CommandError::Syntax)
        ));
    }

    #[test]
    fn blank_line_is_a_no_op() {
        let table = CommandTable::new(ENTRIES);
        let mut ctx = Counter { calls: Vec::new() };
        table
            .dispatch(&mut ctx, &tokenize("", 25))
            .expect("blank");
        assert!(ctx.calls.is_empty());
    }
}
