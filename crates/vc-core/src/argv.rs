//! Structured parsing of tunnel-client argument vectors
//!
//! Process command lines are never re-joined into a string and pattern
//! matched. Instead [`tokenize`] walks the argument vector with a
//! flag-to-arity table and yields [`Token`]s, and the matching rules
//! ([`parse_forward_spec`], [`infer_host`]) operate on those tokens.

/// One parsed element of an argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A flag and the values it consumed
    Flag { flag: char, values: Vec<String> },
    /// A bare argument
    Positional(String),
}

/// Which single-letter flags take a value
#[derive(Debug, Clone, Copy)]
pub struct ArityTable {
    with_value: &'static str,
}

impl ArityTable {
    /// Arity table for OpenSSH's `ssh` client
    pub const SSH: ArityTable = ArityTable {
        with_value: "BbcDEeFIiJLlmOopPQRSWw",
    };

    /// Number of values `flag` consumes
    pub fn arity(&self, flag: char) -> usize {
        usize::from(self.with_value.contains(flag))
    }
}

/// Tokenize `args` (without the program name).
///
/// Supports attached values (`-L16100:localhost:8000`), clustered boolean
/// flags (`-NT`), and `--` as end of options. Unknown flags are treated as
/// boolean. A value-taking flag at the very end receives no value.
pub fn tokenize<S: AsRef<str>>(args: &[S], table: &ArityTable) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut iter = args.iter().map(AsRef::as_ref);
    let mut options_done = false;

    while let Some(arg) = iter.next() {
        if options_done || arg == "-" || !arg.starts_with('-') {
            tokens.push(Token::Positional(arg.to_string()));
            continue;
        }
        if arg == "--" {
            options_done = true;
            continue;
        }

        let cluster = &arg[1..];
        for (idx, flag) in cluster.char_indices() {
            if table.arity(flag) == 0 {
                tokens.push(Token::Flag {
                    flag,
                    values: Vec::new(),
                });
                continue;
            }

            let attached = &cluster[idx + flag.len_utf8()..];
            let value = if attached.is_empty() {
                iter.next().map(str::to_string)
            } else {
                Some(attached.to_string())
            };
            tokens.push(Token::Flag {
                flag,
                values: value.into_iter().collect(),
            });
            break;
        }
    }

    tokens
}

/// A local forwarding specification `local_port:host:remote_port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    pub local_port: u16,
    pub target: String,
    pub remote_port: u16,
}

/// Parse the value of a `-L` flag.
///
/// Accepts `<local>:<host>:<remote>` and, when the bind address is an
/// explicit loopback literal, `<bind>:<local>:<host>:<remote>`. Socket-path
/// forms and non-loopback binds are ignored.
pub fn parse_forward_spec(value: &str) -> Option<ForwardSpec> {
    let parts: Vec<&str> = value.split(':').collect();
    let (local, target, remote) = match parts.as_slice() {
        [local, target, remote] => (*local, *target, *remote),
        [bind, local, target, remote] if is_loopback_literal(bind) => (*local, *target, *remote),
        _ => return None,
    };

    if target.is_empty() || !target.chars().all(is_host_char) {
        return None;
    }

    Some(ForwardSpec {
        local_port: parse_port(local)?,
        target: target.to_string(),
        remote_port: parse_port(remote)?,
    })
}

/// All forwarding specs carried by `-L` flags, in argument order
pub fn forward_specs(tokens: &[Token]) -> Vec<ForwardSpec> {
    tokens
        .iter()
        .filter_map(|token| match token {
            Token::Flag { flag: 'L', values } => values.first(),
            _ => None,
        })
        .filter_map(|value| parse_forward_spec(value))
        .collect()
}

/// Destination host: the first positional that is not itself a spec.
///
/// Positionals after the host are the remote command and are ignored.
pub fn infer_host(tokens: &[Token]) -> Option<String> {
    tokens.iter().find_map(|token| match token {
        Token::Positional(arg) if !arg.is_empty() && !arg.contains(':') => Some(arg.clone()),
        _ => None,
    })
}

fn is_loopback_literal(bind: &str) -> bool {
    matches!(bind, "127.0.0.1" | "localhost")
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u16>().ok().filter(|p| *p != 0)
}
