//! Access permission sets carried by access DOTs.

use crate::errors::{BwError, StatusCode};
use std::fmt;

const BIT_C: u16 = 0x01;
const BIT_C_PLUS: u16 = 0x02;
const BIT_C_STAR: u16 = 0x04;
const BIT_T: u16 = 0x08;
const BIT_T_PLUS: u16 = 0x10;
const BIT_T_STAR: u16 = 0x20;
const BIT_P: u16 = 0x40;
const BIT_L: u16 = 0x80;

/// The `C`/`T`/`P`/`L` permission family.
///
/// The plus and star variants imply their weaker forms: `C*` implies `C+`
/// which implies `C`. Constructors normalise to keep that true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessPermissions {
    pub consume: bool,
    pub consume_plus: bool,
    pub consume_star: bool,
    pub tap: bool,
    pub tap_plus: bool,
    pub tap_star: bool,
    pub publish: bool,
    pub list: bool,
}

impl AccessPermissions {
    /// Decode the 16-bit wire mask.
    pub fn from_bits(bits: u16) -> Self {
        Self {
            consume: bits & BIT_C != 0,
            consume_plus: bits & BIT_C_PLUS != 0,
            consume_star: bits & BIT_C_STAR != 0,
            tap: bits & BIT_T != 0,
            tap_plus: bits & BIT_T_PLUS != 0,
            tap_star: bits & BIT_T_STAR != 0,
            publish: bits & BIT_P != 0,
            list: bits & BIT_L != 0,
        }
        .normalized()
    }

    /// Encode to the 16-bit wire mask, implied bits included.
    pub fn to_bits(&self) -> u16 {
        let p = self.normalized();
        let mut bits = 0;
        for (set, bit) in [
            (p.consume, BIT_C),
            (p.consume_plus, BIT_C_PLUS),
            (p.consume_star, BIT_C_STAR),
            (p.tap, BIT_T),
            (p.tap_plus, BIT_T_PLUS),
            (p.tap_star, BIT_T_STAR),
            (p.publish, BIT_P),
            (p.list, BIT_L),
        ] {
            if set {
                bits |= bit;
            }
        }
        bits
    }

    fn normalized(mut self) -> Self {
        if self.consume_star {
            self.consume_plus = true;
        }
        if self.consume_plus {
            self.consume = true;
        }
        if self.tap_star {
            self.tap_plus = true;
        }
        if self.tap_plus {
            self.tap = true;
        }
        self
    }

    /// Parse a permission string such as `"C*P"` or `"c+t"`.
    pub fn parse(s: &str) -> Result<Self, BwError> {
        let mut p = Self::default();
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let modifier = bytes.get(i + 1).copied();
            match bytes[i].to_ascii_uppercase() {
                b'C' | b'T' => {
                    let consume = bytes[i].eq_ignore_ascii_case(&b'C');
                    let (base, plus, star) = if consume {
                        (&mut p.consume, &mut p.consume_plus, &mut p.consume_star)
                    } else {
                        (&mut p.tap, &mut p.tap_plus, &mut p.tap_star)
                    };
                    *base = true;
                    match modifier {
                        Some(b'+') => {
                            *plus = true;
                            i += 1;
                        }
                        Some(b'*') => {
                            *plus = true;
                            *star = true;
                            i += 1;
                        }
                        _ => {}
                    }
                }
                b'P' => p.publish = true,
                b'L' => p.list = true,
                _ => {
                    return Err(BwError::new(
                        StatusCode::BadOperation,
                        format!("invalid permission string {s:?}"),
                    ))
                }
            }
            i += 1;
        }
        Ok(p)
    }

    /// Restrict this set by another DOT's set further down a chain.
    ///
    /// Plain bits intersect. A plus bit survives only if the other side has
    /// both plus and base, and a star bit only if it has all three.
    pub fn reduce_by(&mut self, rhs: &AccessPermissions) {
        self.consume &= rhs.consume;
        self.consume_plus &= rhs.consume_plus && rhs.consume;
        self.consume_star &= rhs.consume_star && rhs.consume_plus && rhs.consume;
        self.tap &= rhs.tap;
        self.tap_plus &= rhs.tap_plus && rhs.tap;
        self.tap_star &= rhs.tap_star && rhs.tap_plus && rhs.tap;
        self.publish &= rhs.publish;
        self.list &= rhs.list;
    }

    /// Does every permission in `self` appear in `other`?
    pub fn is_subset_of(&self, other: &AccessPermissions) -> bool {
        (!self.consume || other.consume)
            && (!self.consume_plus || other.consume_plus)
            && (!self.consume_star || other.consume_star)
            && (!self.tap || other.tap)
            && (!self.tap_plus || other.tap_plus)
            && (!self.tap_star || other.tap_star)
            && (!self.publish || other.publish)
            && (!self.list || other.list)
    }

    pub fn is_empty(&self) -> bool {
        self.to_bits() == 0
    }

    /// Canonical string form: `C*`/`C+`/`C`, `T*`/`T+`/`T`, `P`, `L`.
    pub fn to_perm_string(&self) -> String {
        let mut s = String::new();
        if self.consume_star {
            s.push_str("C*");
        } else if self.consume_plus {
            s.push_str("C+");
        } else if self.consume {
            s.push('C');
        }
        if self.tap_star {
            s.push_str("T*");
        } else if self.tap_plus {
            s.push_str("T+");
        } else if self.tap {
            s.push('T');
        }
        if self.publish {
            s.push('P');
        }
        if self.list {
            s.push('L');
        }
        s
    }
}

impl fmt::Display for AccessPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_perm_string())
    }
}
