// src/controller/command.rs — Operator commands typed during a session

/// One line of operator input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatorCommand {
    Pause,
    Resume,
    Stop,
    /// New time target, minutes.
    Time(f64),
    /// New energy target, joules.
    Energy(f64),
    /// New master power, watts.
    Power(u8),
    Status,
    Help,
}

pub const HELP: &str = "  Commands: pause | resume | stop | time <min> | energy <J> | power <W> | status | help";

impl OperatorCommand {
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut parts = input.trim().splitn(2, char::is_whitespace);
        let cmd = parts.next().unwrap_or("").to_lowercase();
        let arg = parts.next().map(str::trim).unwrap_or("");

        let number = |what: &str| -> Result<f64, String> {
            if arg.is_empty() {
                return Err(format!("Usage: {} <value>", what));
            }
            match arg.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
                _ => Err(format!("Invalid number: {}", arg)),
            }
        };

        match cmd.as_str() {
            "pause" | "p" => Ok(Self::Pause),
            "resume" | "r" | "play" => Ok(Self::Resume),
            "stop" | "quit" | "exit" => Ok(Self::Stop),
            "time" | "t" => number("time").map(Self::Time),
            "energy" | "e" => number("energy").map(Self::Energy),
            "power" | "w" => {
                if arg.is_empty() {
                    return Err("Usage: power <W>".into());
                }
                arg.parse::<u8>()
                    .map(Self::Power)
                    .map_err(|_| format!("Invalid power: {}", arg))
            }
            "status" | "s" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "" => Err("Empty command".into()),
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(OperatorCommand::parse("pause"), Ok(OperatorCommand::Pause));
        assert_eq!(OperatorCommand::parse("  RESUME \n"), Ok(OperatorCommand::Resume));
        assert_eq!(OperatorCommand::parse("stop"), Ok(OperatorCommand::Stop));
        assert_eq!(OperatorCommand::parse("status"), Ok(OperatorCommand::Status));
    }

    #[test]
    fn test_parse_with_arguments() {
        assert_eq!(OperatorCommand::parse("time 5"), Ok(OperatorCommand::Time(5.0)));
        assert_eq!(
            OperatorCommand::parse("energy 3100.5"),
            Ok(OperatorCommand::Energy(3100.5))
        );
        assert_eq!(OperatorCommand::parse("power 12"), Ok(OperatorCommand::Power(12)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(OperatorCommand::parse("time").is_err());
        assert!(OperatorCommand::parse("time -3").is_err());
        assert!(OperatorCommand::parse("energy lots").is_err());
        assert!(OperatorCommand::parse("power 300").is_err());
        assert!(OperatorCommand::parse("fire").is_err());
        assert!(OperatorCommand::parse("").is_err());
    }
}
