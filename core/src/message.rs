//! Payload grammar: `.`-separated text with a one-character tag.

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("wall count is missing or not a number")]
    WallCount,

    #[error("wall batch is shorter than its fixed prefix")]
    WallBatchTruncated,

    #[error("wall batch declares {expected} walls but carries {actual}")]
    WallCountMismatch { expected: usize, actual: usize },

    #[error("ball state needs 6 fields, got {0}")]
    BallFields(usize),

    #[error("invalid number: {0}")]
    Number(#[from] std::num::ParseFloatError),
}

#[derive(Debug, PartialEq, Clone)]
pub enum ServerMessage {
    /// `"b..."` — a ball is ready on the server side. The body is left
    /// to the caller; this is only the notification trigger.
    Ball,
    /// `"w.<count>.<4-char-skip><wall1>=...=<wallN>"` — a wall batch
    /// replacing any prior one.
    Walls(Vec<String>),
    /// Anything else: opaque status text, no event.
    Status(String),
}

impl ServerMessage {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        match raw.split('.').next().unwrap_or("") {
            "b" => Ok(Self::Ball),
            "w" => parse_walls(raw).map(Self::Walls),
            _ => Ok(Self::Status(raw.to_string())),
        }
    }
}

fn parse_walls(raw: &str) -> Result<Vec<String>, ParseError> {
    let mut fields = raw.splitn(3, '.');
    fields.next(); // tag
    let count: usize = fields
        .next()
        .and_then(|count| count.parse().ok())
        .ok_or(ParseError::WallCount)?;
    let rest = fields.next().ok_or(ParseError::WallBatchTruncated)?;

    // Four filler characters sit between the second `.` and the first wall.
    let skip = rest
        .char_indices()
        .nth(3)
        .map(|(i, c)| i + c.len_utf8())
        .ok_or(ParseError::WallBatchTruncated)?;
    let body = &rest[skip..];

    let walls: Vec<String> = if body.is_empty() {
        Vec::new()
    } else {
        body.split('=').map(str::to_string).collect()
    };
    if walls.len() != count {
        return Err(ParseError::WallCountMismatch {
            expected: count,
            actual: walls.len(),
        });
    }
    Ok(walls)
}

/// Position, velocity and acceleration of one ball, as exchanged with
/// the server in `"x:y:vx:vy:ax:ay"` form.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct BallState {
    pub position: (f64, f64),
    pub velocity: (f64, f64),
    pub acceleration: (f64, f64),
}

impl BallState {
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.position.0,
            self.position.1,
            self.velocity.0,
            self.velocity.1,
            self.acceleration.0,
            self.acceleration.1
        )
    }

    pub fn decode(payload: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = payload.split(':').collect();
        if fields.len() != 6 {
            return Err(ParseError::BallFields(fields.len()));
        }
        let mut numbers = [0f64; 6];
        for (slot, field) in numbers.iter_mut().zip(&fields) {
            *slot = field.parse()?;
        }
        Ok(Self {
            position: (numbers[0], numbers[1]),
            velocity: (numbers[2], numbers[3]),
            acceleration: (numbers[4], numbers[5]),
        })
    }
}
