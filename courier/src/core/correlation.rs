use super::error::CoreError;
use super::fact::ProcessKey;
use std::fmt;
use std::str::FromStr;

/// Routes an inbound callback back to the attempt that started it.
///
/// Rendered as `process:id:attempt`, e.g. `transcription:17:2`. The process
/// name may itself contain `:`; parsing splits from the right.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId {
    pub key: ProcessKey,
    pub attempt: u32,
}

impl CorrelationId {
    pub fn new(key: ProcessKey, attempt: u32) -> Self {
        Self { key, attempt }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.key.process, self.key.id, self.attempt)
    }
}

impl FromStr for CorrelationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidCorrelationId(s.to_string());

        let mut parts = s.rsplitn(3, ':');
        let attempt = parts.next().ok_or_else(invalid)?;
        let id = parts.next().ok_or_else(invalid)?;
        let process = parts.next().ok_or_else(invalid)?;
        if process.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            key: ProcessKey::new(process, id.parse().map_err(|_| invalid())?),
            attempt: attempt.parse().map_err(|_| invalid())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: CorrelationId = "transcription:17:2".parse().unwrap();
        assert_eq!(id.key, ProcessKey::new("transcription", 17));
        assert_eq!(id.attempt, 2);
        assert_eq!(id.to_string(), "transcription:17:2");

        let nested: CorrelationId = "billing:transcribe:5:1".parse().unwrap();
        assert_eq!(nested.key.process, "billing:transcribe");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "17:2", ":17:2", "transcription:x:2", "transcription:17:-1"] {
            assert!(bad.parse::<CorrelationId>().is_err(), "{bad} should not parse");
        }
    }
}
