/// Available commands, autocomplete and argument parsing

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  /// Argument placeholder shown next to the name, e.g. `<id>`
  pub args: Option<&'static str>,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "tasks",
    aliases: &["t", "todos", "list"],
    args: None,
    description: "Browse all tasks",
  },
  Command {
    name: "owner",
    aliases: &["o", "user"],
    args: Some("<id>"),
    description: "Tasks of one owner",
  },
  Command {
    name: "task",
    aliases: &["show"],
    args: Some("<id>"),
    description: "Open a task by id",
  },
  Command {
    name: "random",
    aliases: &["r", "rand"],
    args: None,
    description: "Show a random task",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    args: None,
    description: "Exit t9s",
  },
];

/// A parsed command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
  Tasks,
  Owner(u64),
  Task(u64),
  Random,
  Quit,
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Look up a command by exact name or alias
pub fn find(word: &str) -> Option<&'static Command> {
  let word = word.to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == word || cmd.aliases.contains(&word.as_str()))
}

/// Parse a submitted command line such as `owner 3`
pub fn parse(line: &str) -> Result<AppCommand, String> {
  let mut words = line.split_whitespace();
  let word = words.next().ok_or_else(|| "Empty command".to_string())?;
  let cmd = find(word).ok_or_else(|| format!("Unknown command: {}", word))?;
  let arg = words.next();
  if words.next().is_some() {
    return Err(format!("Too many arguments for {}", cmd.name));
  }

  let id = |arg: Option<&str>| -> Result<u64, String> {
    let raw = arg.ok_or_else(|| format!("Usage: {} <id>", cmd.name))?;
    raw
      .parse::<u64>()
      .ok()
      .filter(|id| *id > 0)
      .ok_or_else(|| format!("Invalid id: {}", raw))
  };

  match cmd.name {
    "owner" => id(arg).map(AppCommand::Owner),
    "task" => id(arg).map(AppCommand::Task),
    name if arg.is_some() => Err(format!("{} takes no arguments", name)),
    "tasks" => Ok(AppCommand::Tasks),
    "random" => Ok(AppCommand::Random),
    _ => Ok(AppCommand::Quit),
  }
}
