//! Platform-independent pieces of the native process adapters.
//!
//! These are pure functions over plain data so that the Windows adapter's
//! encoding and tree-walking rules are exercised on every platform.
use std::collections::{HashMap, HashSet, VecDeque};

/// Computes every transitive descendant of `root` from `(pid, parent_pid)`
/// pairs of a process-table snapshot.
///
/// Results are breadth-first, so a parent always precedes its children.
/// `root` is never included, and cycles caused by pid reuse are cut.
pub fn descendants_of(root: u32, table: &[(u32, u32)]) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for &(pid, parent) in table {
        if pid != parent {
            children.entry(parent).or_default().push(pid);
        }
    }

    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut result = Vec::new();

    while let Some(parent) = queue.pop_front() {
        if let Some(kids) = children.get(&parent) {
            for &kid in kids {
                if seen.insert(kid) {
                    result.push(kid);
                    queue.push_back(kid);
                }
            }
        }
    }

    result
}

/// Merges the parent environment with `overrides`.
///
/// Names are compared case-insensitively, as Windows does, and the result is
/// sorted the way `CreateProcessW` expects its environment block.
pub fn merge_environment<I>(parent: I, overrides: &HashMap<String, String>) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged: HashMap<String, (String, String)> = HashMap::new();
    for (key, value) in parent {
        merged.insert(key.to_uppercase(), (key, value));
    }
    for (key, value) in overrides {
        merged.insert(key.to_uppercase(), (key.clone(), value.clone()));
    }

    let mut vars: Vec<(String, String)> = merged.into_values().collect();
    vars.sort_by(|a, b| a.0.to_uppercase().cmp(&b.0.to_uppercase()));
    vars
}

/// Encodes variables as a UTF-16 environment block: `KEY=VALUE` entries, each
/// terminated by a NUL, with one extra NUL closing the block.
pub fn environment_block(vars: &[(String, String)]) -> Vec<u16> {
    let mut block = Vec::new();
    for (key, value) in vars {
        block.extend(key.encode_utf16());
        block.push(u16::from(b'='));
        block.extend(value.encode_utf16());
        block.push(0);
    }
    if block.is_empty() {
        // An empty block still needs its entry terminator.
        block.push(0);
    }
    block.push(0);
    block
}

/// Quotes one argument following the `CommandLineToArgvW` rules.
pub fn quote_windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\u{b}', '"']) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat_n('\\', backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat_n('\\', backslashes * 2));
    quoted.push('"');
    quoted
}

/// Builds a full command line: the program followed by its arguments.
pub fn windows_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(quote_windows_arg)
        .collect::<Vec<_>>()
        .join(" ")
}
