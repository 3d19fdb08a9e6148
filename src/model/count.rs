use serde_json::Value;

/// Content of the global `likes/count` slot as it was found in the store.
///
/// The slot is shared with every other writer of the store, so it is read loosely and
/// normalized by the reader rather than trusted to always hold a number.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredCount {
    Missing,
    Count(u64),
    Malformed(Value),
}

impl StoredCount {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Number(number)) => match number.as_u64() {
                Some(count) => Self::Count(count),
                None => Self::Malformed(Value::Number(number.clone())),
            },
            Some(other) => Self::Malformed(other.clone()),
        }
    }

    /// The count, if the slot holds a valid one.
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Count(count) => Some(*count),
            _ => None,
        }
    }

    /// The count a reader should show, treating anything invalid as zero.
    pub fn normalized(&self) -> u64 {
        self.count().unwrap_or(0)
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Count(_))
    }

    /// The raw value this slot was read as, for conditional writes against it.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Self::Missing => None,
            Self::Count(count) => Some(Value::from(*count)),
            Self::Malformed(value) => Some(value.clone()),
        }
    }
}
