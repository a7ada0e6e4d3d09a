use shared::error::*;
use std::fmt;

use crate::attributes::*;
use crate::message::*;

const MAX_SOFTWARE_B: usize = 763;

/// Software is SOFTWARE attribute.
///
/// RFC 5389 Section 15.10
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Software(pub String);

impl fmt::Display for Software {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Setter for Software {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        if self.0.len() > MAX_SOFTWARE_B {
            return Err(Error::ErrAttributeSizeOverflow);
        }
        m.add(ATTR_SOFTWARE, self.0.as_bytes());
        Ok(())
    }
}

impl Getter for Software {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_SOFTWARE)?;
        self.0 = String::from_utf8(v.to_vec())?;
        Ok(())
    }
}
