//! POSIX signal names as accepted by the `kill` verb.

use std::fmt::Display;

use nix::sys::signal::Signal as NixSignal;

/// A signal destined for a container's init process.
///
/// Accepts the forms engines actually pass: a number (`9`), a bare name
/// (`KILL`), or the full name (`SIGKILL`), case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal(NixSignal);

#[derive(Debug, thiserror::Error)]
#[error("invalid signal: {0}")]
pub struct SignalError(pub String);

impl TryFrom<&str> for Signal {
    type Error = SignalError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if let Ok(num) = s.parse::<i32>() {
            return Signal::try_from(num);
        }

        let mut name = s.to_ascii_uppercase();
        if !name.starts_with("SIG") {
            name.insert_str(0, "SIG");
        }
        NixSignal::iterator()
            .find(|sig| sig.as_str() == name)
            .map(Signal)
            .ok_or_else(|| SignalError(s.to_string()))
    }
}

impl TryFrom<i32> for Signal {
    type Error = SignalError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        NixSignal::try_from(value)
            .map(Signal)
            .map_err(|_| SignalError(value.to_string()))
    }
}

impl From<NixSignal> for Signal {
    fn from(sig: NixSignal) -> Self {
        Signal(sig)
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl Signal {
    pub fn into_raw(self) -> NixSignal {
        self.0
    }

    pub fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::Signal::*;

    use super::*;

    #[test]
    fn test_parse_names_and_numbers() {
        for (expected, inputs) in [
            (SIGHUP, vec!["1", "HUP", "SIGHUP", "sighup"]),
            (SIGINT, vec!["2", "INT", "SIGINT"]),
            (SIGKILL, vec!["9", "KILL", "sigkill"]),
            (SIGTERM, vec!["15", "TERM", "SIGTERM", "term"]),
            (SIGUSR2, vec!["12", "usr2", "SIGUSR2"]),
        ] {
            for input in inputs {
                assert_eq!(Signal::try_from(input).unwrap().into_raw(), expected);
            }
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Signal::try_from("SIGWOOF").is_err());
        assert!(Signal::try_from("").is_err());
        assert!(Signal::try_from(-3).is_err());
        assert!(Signal::try_from(4096).is_err());
    }

    #[test]
    fn test_raw_round_trip() {
        let sig = Signal::try_from("SIGTERM").unwrap();
        assert_eq!(sig.as_i32(), 15);
        assert_eq!(Signal::try_from(15).unwrap(), sig);
    }
}
