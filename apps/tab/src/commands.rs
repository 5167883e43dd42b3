//! Line commands read from stdin.

/// One operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(String),
    Pause,
    Resume,
    Toggle,
    Next,
    Previous,
    /// Target position in milliseconds.
    Seek(u64),
    /// Volume 0.0 - 1.0.
    Volume(f32),
    Status,
    /// Stores credentials from an authorization callback fragment.
    Login(String),
    Quit,
}

pub const HELP: &str = "commands: play <uri> | pause | resume | toggle | next | prev | \
seek <m:ss|ms> | volume <0-100> | status | login <fragment> | quit";

/// Parses one line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();

    let command = match (name, arg) {
        ("play", Some(uri)) => Command::Play(uri.to_string()),
        ("pause", None) => Command::Pause,
        ("resume", None) => Command::Resume,
        ("toggle", None) => Command::Toggle,
        ("next", None) => Command::Next,
        ("prev" | "previous", None) => Command::Previous,
        ("seek", Some(position)) => Command::Seek(parse_position(position)?),
        ("volume", Some(level)) => {
            let percent: u8 = level
                .parse()
                .map_err(|_| format!("invalid volume: {}", level))?;
            if percent > 100 {
                return Err(format!("volume out of range: {}", percent));
            }
            Command::Volume(f32::from(percent) / 100.0)
        }
        ("status", None) => Command::Status,
        ("login", Some(fragment)) => Command::Login(fragment.to_string()),
        ("quit" | "exit", None) => Command::Quit,
        _ => return Err(format!("unrecognized command: {}", line.trim())),
    };
    Ok(Some(command))
}

/// Accepts `m:ss` or plain milliseconds.
fn parse_position(value: &str) -> Result<u64, String> {
    let invalid = || format!("invalid position: {}", value);
    match value.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
            let seconds: u64 = seconds.parse().map_err(|_| invalid())?;
            if seconds >= 60 {
                return Err(invalid());
            }
            Ok((minutes * 60 + seconds) * 1000)
        }
        None => value.parse().map_err(|_| invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse("play spotify:track:abc").unwrap(),
            Some(Command::Play("spotify:track:abc".into()))
        );
        assert_eq!(parse("  prev ").unwrap(), Some(Command::Previous));
        assert_eq!(parse("seek 1:30").unwrap(), Some(Command::Seek(90_000)));
        assert_eq!(parse("seek 4500").unwrap(), Some(Command::Seek(4_500)));
        assert_eq!(parse("volume 40").unwrap(), Some(Command::Volume(0.4)));
        assert_eq!(parse("").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("play").is_err());
        assert!(parse("seek 1:75").is_err());
        assert!(parse("volume 150").is_err());
        assert!(parse("dance").is_err());
    }
}
