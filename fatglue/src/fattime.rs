//! FAT directory-entry timestamps
//!
//! Packed `DWORD` as FatFs `get_fattime` returns it:
//!
//! ```text
//! 31..25 year - 1980   24..21 month   20..16 day
//! 15..11 hour          10..5  minute  4..0   second / 2
//! ```

/// Packed FAT date and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FatTimestamp(u32);

const SECONDS_PER_DAY: u64 = 86_400;
const FAT_YEAR_MIN: u32 = 1980;
const FAT_YEAR_MAX: u32 = 2107;

impl FatTimestamp {
    /// 1980-01-01 00:00:00, reported when no real-time clock exists.
    pub const EPOCH: Self = Self((1 << 21) | (1 << 16));

    /// 2107-12-31 23:59:58, the last representable instant.
    pub const MAX: Self = Self(
        (127 << 25) | (12 << 21) | (31 << 16) | (23 << 11) | (59 << 5) | 29,
    );

    /// Pack calendar fields. Years outside 1980..=2107 clamp to the ends
    /// of the range; other fields are taken as given.
    pub fn from_parts(year: u32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        if year < FAT_YEAR_MIN {
            return Self::EPOCH;
        }
        if year > FAT_YEAR_MAX {
            return Self::MAX;
        }

        Self(
            ((year - FAT_YEAR_MIN) << 25)
                | ((month as u32 & 0x0F) << 21)
                | ((day as u32 & 0x1F) << 16)
                | ((hour as u32 & 0x1F) << 11)
                | ((minute as u32 & 0x3F) << 5)
                | ((second as u32 / 2) & 0x1F),
        )
    }

    /// Timestamp for Unix time `secs` (UTC).
    pub fn from_unix(secs: u64) -> Self {
        let days = secs / SECONDS_PER_DAY;
        let rem = secs % SECONDS_PER_DAY;
        let (year, month, day) = civil_from_days(days);

        Self::from_parts(
            year,
            month,
            day,
            (rem / 3600) as u8,
            ((rem / 60) % 60) as u8,
            (rem % 60) as u8,
        )
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// FAT date word (high half).
    pub fn date(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// FAT time word (low half).
    pub fn time(self) -> u16 {
        self.0 as u16
    }

    pub fn year(self) -> u32 {
        FAT_YEAR_MIN + (self.0 >> 25)
    }

    pub fn month(self) -> u8 {
        ((self.0 >> 21) & 0x0F) as u8
    }

    pub fn day(self) -> u8 {
        ((self.0 >> 16) & 0x1F) as u8
    }

    pub fn hour(self) -> u8 {
        ((self.0 >> 11) & 0x1F) as u8
    }

    pub fn minute(self) -> u8 {
        ((self.0 >> 5) & 0x3F) as u8
    }

    pub fn second(self) -> u8 {
        ((self.0 & 0x1F) * 2) as u8
    }
}

// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: u64) -> (u32, u8, u8) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + u64::from(month <= 2);

    (year.min(u32::MAX as u64) as u32, month, day)
}
