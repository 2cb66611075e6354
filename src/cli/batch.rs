//! Batch grammar.
//!
//! A batch is a sequence of groups. A group starts at a word beginning with
//! `--` and takes every following word up to the next such word:
//! - `--start S...` and `--stop S...` need at least one service
//! - `--status [S...]` watches all services or each one named
//! - `--errwatch` takes nothing
//! - `--NAME [ARGS...]` is a simple command
//!
//! The first group may also be a bare `NAME [ARGS...]`.

use eyre::{Result, bail};

use ngcs::commands::CommandSpec;

const GROUP_PREFIX: &str = "--";

/// Turn batch words into command specs, in order.
pub fn parse_batch(words: &[String]) -> Result<Vec<CommandSpec>> {
    let mut specs = Vec::new();
    let mut rest = words;

    while let Some((head, tail)) = rest.split_first() {
        let split = tail
            .iter()
            .position(|word| word.starts_with(GROUP_PREFIX))
            .unwrap_or(tail.len());
        let (args, next) = tail.split_at(split);
        rest = next;

        match head.strip_prefix(GROUP_PREFIX) {
            Some(name) => parse_group(name, args, &mut specs)?,
            None if specs.is_empty() => specs.push(CommandSpec::simple(head.as_str(), args.to_vec())),
            // unreachable: later groups always start with the prefix
            None => bail!("Unexpected argument '{}'", head),
        }
    }

    if specs.is_empty() {
        bail!("No commands given");
    }
    Ok(specs)
}

fn parse_group(name: &str, args: &[String], specs: &mut Vec<CommandSpec>) -> Result<()> {
    match name {
        "" => bail!("Empty command name '--'"),
        "start" | "stop" if args.is_empty() => bail!("--{} needs at least one service", name),
        "start" => specs.extend(args.iter().cloned().map(CommandSpec::Start)),
        "stop" => specs.extend(args.iter().cloned().map(CommandSpec::Stop)),
        "status" if args.is_empty() => specs.push(CommandSpec::Status(None)),
        "status" => specs.extend(args.iter().cloned().map(|service| CommandSpec::Status(Some(service)))),
        "errwatch" if !args.is_empty() => bail!("--errwatch takes no arguments"),
        "errwatch" => specs.push(CommandSpec::ErrWatch),
        other => specs.push(CommandSpec::simple(other, args.to_vec())),
    }
    Ok(())
}
