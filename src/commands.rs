// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use location_client::EntityId;

pub const HELP: &str = "\
Commands:
  request <terminal>   fetch the latest location now (alias: r)
  locate <terminal>    centre on a vehicle already in the list (alias: l)
  list                 show the vehicle list
  help                 show this help
  quit                 close the monitor (alias: exit)";

/// Operator command typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Request(EntityId),
    Locate(EntityId),
    List,
    Help,
    Quit,
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();
    if words.next().is_some() {
        return Err(format!("Too many arguments for '{verb}'"));
    }

    let command = match (verb.to_ascii_lowercase().as_str(), argument) {
        ("request" | "r", Some(id)) => Command::Request(EntityId::from(id)),
        ("locate" | "l", Some(id)) => Command::Locate(EntityId::from(id)),
        ("request" | "r" | "locate" | "l", None) => {
            return Err(format!("'{verb}' needs a terminal id"));
        }
        ("list", None) => Command::List,
        ("help" | "?", None) => Command::Help,
        ("quit" | "exit", None) => Command::Quit,
        _ => return Err(format!("Unknown command '{}'. Type 'help' for commands.", line.trim())),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse("request 13800000001"),
            Ok(Some(Command::Request(EntityId::new("13800000001"))))
        );
        assert_eq!(parse("  L  T1 "), Ok(Some(Command::Locate(EntityId::new("T1")))));
        assert_eq!(parse("list"), Ok(Some(Command::List)));
        assert_eq!(parse("exit"), Ok(Some(Command::Quit)));
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("request").unwrap_err().contains("needs a terminal id"));
        assert!(parse("locate T1 T2").unwrap_err().contains("Too many arguments"));
        assert!(parse("list T1").unwrap_err().starts_with("Unknown command"));
        assert!(parse("dvr T1").unwrap_err().starts_with("Unknown command"));
    }
}
