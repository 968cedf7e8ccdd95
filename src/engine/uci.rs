//! Parser of the [UCI] commands the engine understands.
//!
//! [UCI]: https://www.chessprogramming.org/UCI

#[derive(Debug, PartialEq)]
pub(super) enum Command {
    Uci,
    IsReady,
    SetOption {
        option: EngineOption,
        value: OptionValue,
    },
    SetPosition {
        fen: Option<String>,
        moves: Vec<String>,
    },
    NewGame,
    Go(Go),
    Stop,
    Quit,
    Unknown(String),
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum EngineOption {
    ExplorationWeight,
    ThinkTime,
}

#[derive(Debug, PartialEq)]
pub(super) enum OptionValue {
    Float(f64),
    Integer(u64),
}

/// Search limits of the `go` command. Times are in milliseconds.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct Go {
    pub(super) wtime: Option<u64>,
    pub(super) btime: Option<u64>,
    pub(super) winc: Option<u64>,
    pub(super) binc: Option<u64>,
    pub(super) nodes: Option<u64>,
    pub(super) movetime: Option<u64>,
    pub(super) infinite: bool,
}

fn parse_go(parts: &[&str]) -> Command {
    let mut go = Go::default();

    let mut i = 1;
    while i < parts.len() {
        let value = parts.get(i + 1).and_then(|value| value.parse().ok());
        match parts[i] {
            "wtime" => go.wtime = value,
            "btime" => go.btime = value,
            "winc" => go.winc = value,
            "binc" => go.binc = value,
            "nodes" => go.nodes = value,
            "movetime" => go.movetime = value,
            "infinite" => go.infinite = true,
            // Depth-based limits and move pondering do not apply.
            _ => {},
        }
        if parts[i] == "infinite" {
            i += 1;
        } else {
            i += 2;
        }
    }

    Command::Go(go)
}

fn parse_setoption(parts: &[&str]) -> Command {
    if parts.len() < 5 || parts[1] != "name" {
        return Command::Unknown(parts.join(" "));
    }
    let Some(name_end) = parts.iter().position(|&x| x == "value") else {
        return Command::Unknown(parts.join(" "));
    };
    let option = match parts[2..name_end].join(" ").as_str() {
        "ExplorationWeight" => EngineOption::ExplorationWeight,
        "ThinkTime" => EngineOption::ThinkTime,
        _ => return Command::Unknown(parts.join(" ")),
    };
    let value = parts.get(name_end + 1).and_then(|value| match option {
        EngineOption::ExplorationWeight => value
            .parse::<f64>()
            .ok()
            .filter(|weight| weight.is_finite() && *weight >= 0.0)
            .map(OptionValue::Float),
        EngineOption::ThinkTime => value
            .parse::<u64>()
            .ok()
            .filter(|&millis| millis > 0)
            .map(OptionValue::Integer),
    });
    match value {
        Some(value) => Command::SetOption { option, value },
        None => Command::Unknown(parts.join(" ")),
    }
}

fn parse_setposition(parts: &[&str]) -> Command {
    let fen_index = parts.iter().position(|&x| x == "fen");
    let moves_index = parts.iter().position(|&x| x == "moves");
    if let (Some(fen_index), Some(moves_index)) = (fen_index, moves_index) {
        if moves_index < fen_index {
            return Command::Unknown(parts.join(" "));
        }
    }
    let fen = fen_index.map(|index| parts[index + 1..moves_index.unwrap_or(parts.len())].join(" "));
    let moves = moves_index.map_or_else(Vec::new, |moves_index| {
        parts[moves_index + 1..]
            .iter()
            .map(ToString::to_string)
            .collect()
    });
    Command::SetPosition { fen, moves }
}

impl Command {
    pub(super) fn parse(input: &str) -> Self {
        let parts: Vec<&str> = input.split_whitespace().collect();

        let Some(&command) = parts.first() else {
            return Self::Unknown(input.trim().to_string());
        };

        match command {
            "uci" => Self::Uci,
            "isready" => Self::IsReady,
            "setoption" => parse_setoption(&parts),
            "position" if parts.len() > 1 => parse_setposition(&parts),
            "ucinewgame" => Self::NewGame,
            "go" => parse_go(&parts),
            "stop" => Self::Stop,
            "quit" => Self::Quit,
            _ => Self::Unknown(input.trim().to_string()),
        }
    }
}
