use std::{
    error::Error,
    net::{Ipv4Addr, Ipv6Addr},
};

use ahash::AHashMap;
use once_cell::sync::Lazy;
use url::Url;

pub(crate) type Check = fn(s: &str) -> Result<(), Box<dyn Error>>;

/// draft-4 formats available without registration.
pub(crate) static FORMATS: Lazy<AHashMap<&'static str, Check>> = Lazy::new(|| {
    let mut m = AHashMap::<&'static str, Check>::new();
    m.insert("date", check_date);
    m.insert("date-time", check_date_time);
    m.insert("email", check_email);
    m.insert("hostname", check_hostname);
    m.insert("host-name", check_hostname);
    m.insert("ipv4", check_ipv4);
    m.insert("ipv6", check_ipv6);
    m.insert("regex", check_regex);
    m.insert("uri", check_uri);
    m
});

fn check_ipv4(s: &str) -> Result<(), Box<dyn Error>> {
    s.parse::<Ipv4Addr>()?;
    Ok(())
}

fn check_ipv6(s: &str) -> Result<(), Box<dyn Error>> {
    s.parse::<Ipv6Addr>()?;
    Ok(())
}

fn check_regex(s: &str) -> Result<(), Box<dyn Error>> {
    regex::Regex::new(s)?;
    Ok(())
}

fn check_uri(s: &str) -> Result<(), Box<dyn Error>> {
    // Url::parse rejects relative references
    Url::parse(s)?;
    Ok(())
}

fn matches_char(s: &str, index: usize, ch: char) -> bool {
    s.is_char_boundary(index) && s[index..].starts_with(ch)
}

fn check_date(s: &str) -> Result<(), Box<dyn Error>> {
    if s.len() != 10 {
        Err("must be 10 characters long")?;
    }
    if !matches_char(s, 4, '-') || !matches_char(s, 7, '-') {
        Err("missing hyphen in correct place")?;
    }

    let mut ymd = s.splitn(3, '-').filter_map(|t| t.parse::<usize>().ok());
    let (Some(y), Some(m), Some(d)) = (ymd.next(), ymd.next(), ymd.next()) else {
        return Err("non-positive year/month/day")?;
    };

    if !matches!(m, 1..=12) {
        Err(format!("{m} months in year"))?;
    }
    if !matches!(d, 1..=31) {
        Err(format!("{d} days in month"))?;
    }

    match m {
        2 => {
            let leap = y % 4 == 0 && (y % 100 != 0 || y % 400 == 0);
            let feb_days = if leap { 29 } else { 28 };
            if d > feb_days {
                Err(format!("february has {feb_days} days only"))?;
            }
        }
        4 | 6 | 9 | 11 if d > 30 => Err("month has 30 days only")?,
        _ => {}
    }
    Ok(())
}

/// `hh:mm:ss[.frac](z|±hh:mm)`
fn check_time(mut s: &str) -> Result<(), Box<dyn Error>> {
    if s.len() < 9 {
        Err("less than 9 characters long")?;
    }
    if !matches_char(s, 2, ':') || !matches_char(s, 5, ':') || !s.is_char_boundary(8) {
        Err("missing colon in correct place")?;
    }
    let mut hms = s[..8].splitn(3, ':').filter_map(|t| t.parse::<usize>().ok());
    let (Some(h), Some(m), Some(sec)) = (hms.next(), hms.next(), hms.next()) else {
        return Err("non-positive hour/min/sec")?;
    };
    if h > 23 || m > 59 || sec > 60 {
        Err("hour/min/sec out of range")?;
    }
    s = &s[8..];

    if let Some(rem) = s.strip_prefix('.') {
        let n_digits = rem.chars().take_while(char::is_ascii_digit).count();
        if n_digits == 0 {
            Err("no digits in second fraction")?;
        }
        s = &rem[n_digits..];
    }

    if s.eq_ignore_ascii_case("z") {
        return Ok(());
    }
    let Some(offset) = s.strip_prefix(['+', '-']) else {
        return Err("offset must begin with plus/minus")?;
    };
    if offset.len() != 5 || !matches_char(offset, 2, ':') {
        Err("offset must be hh:mm")?;
    }
    let mut zhm = offset.splitn(2, ':').filter_map(|t| t.parse::<usize>().ok());
    let (Some(zh), Some(zm)) = (zhm.next(), zhm.next()) else {
        return Err("non-positive hour/min in offset")?;
    };
    if zh > 23 || zm > 59 {
        Err("hour/min in offset out of range")?;
    }
    Ok(())
}

fn check_date_time(s: &str) -> Result<(), Box<dyn Error>> {
    if s.len() < 20 {
        Err("less than 20 characters long")?;
    }
    if !s.is_char_boundary(10) || !s[10..].starts_with(['t', 'T']) {
        Err("11th character must be t or T")?;
    }
    if let Err(e) = check_date(&s[..10]) {
        Err(format!("invalid date element: {e}"))?;
    }
    if let Err(e) = check_time(&s[11..]) {
        Err(format!("invalid time element: {e}"))?;
    }
    Ok(())
}

fn check_hostname(mut s: &str) -> Result<(), Box<dyn Error>> {
    s = s.strip_suffix('.').unwrap_or(s);
    if s.len() > 253 {
        Err("more than 253 characters long")?
    }

    for label in s.split('.') {
        if !matches!(label.len(), 1..=63) {
            Err("label must be 1 to 63 characters long")?;
        }
        if label.starts_with('-') || label.ends_with('-') {
            Err("label starts or ends with hyphen")?;
        }
        if let Some(ch) = label.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
            Err(format!("invalid character {ch:?}"))?;
        }
    }
    Ok(())
}

fn check_email(s: &str) -> Result<(), Box<dyn Error>> {
    if s.len() > 254 {
        Err("more than 254 characters long")?;
    }
    let Some(at) = s.rfind('@') else {
        return Err("missing @")?;
    };
    let (local, domain) = (&s[..at], &s[at + 1..]);

    if local.is_empty() || local.len() > 64 {
        Err("local part must be 1 to 64 characters long")?;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        Err("misplaced dot in local part")?;
    }
    if let Some(ch) = local
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || ".!#$%&'*+-/=?^_`{|}~".contains(*c)))
    {
        Err(format!("invalid character {ch:?}"))?;
    }

    if let Some(ip) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        match ip.strip_prefix("IPv6:") {
            Some(ip) => check_ipv6(ip)?,
            None => check_ipv4(ip)?,
        }
        return Ok(());
    }
    if let Err(e) = check_hostname(domain) {
        Err(format!("invalid domain: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(format: &str, s: &str) -> bool {
        (FORMATS[format])(s).is_ok()
    }

    #[test]
    fn test_date() {
        assert!(valid("date", "2024-02-29"));
        assert!(!valid("date", "2023-02-29"));
        assert!(!valid("date", "2023-04-31"));
        assert!(!valid("date", "2023-4-30"));
        assert!(!valid("date", "foo"));
    }

    #[test]
    fn test_date_time() {
        assert!(valid("date-time", "1963-06-19T08:30:06.283185Z"));
        assert!(valid("date-time", "1963-06-19t08:30:06+05:30"));
        assert!(!valid("date-time", "1963-06-19 08:30:06Z"));
        assert!(!valid("date-time", "1963-06-19T24:30:06Z"));
        assert!(!valid("date-time", "1963-06-19T08:30:06"));
    }

    #[test]
    fn test_hostname() {
        assert!(valid("hostname", "www.example.com"));
        assert!(valid("host-name", "xn--4gbwdl.xn--wgbh1c"));
        assert!(!valid("hostname", "-a-host-name-that-starts-with--"));
        assert!(!valid("hostname", "not_a_valid_host_name"));
        assert!(!valid("hostname", &"a".repeat(64)));
    }

    #[test]
    fn test_email() {
        assert!(valid("email", "joe.bloggs@example.com"));
        assert!(valid("email", "joe@[127.0.0.1]"));
        assert!(!valid("email", "2962"));
        assert!(!valid("email", ".test@example.com"));
        assert!(!valid("email", "te..st@example.com"));
    }

    #[test]
    fn test_ip() {
        assert!(valid("ipv4", "192.168.0.1"));
        assert!(!valid("ipv4", "256.256.256.256"));
        assert!(!valid("ipv4", "127"));
        assert!(valid("ipv6", "::1"));
        assert!(!valid("ipv6", "12345::"));
    }

    #[test]
    fn test_uri_and_regex() {
        assert!(valid("uri", "http://foo.bar/?baz=qux#quux"));
        assert!(!valid("uri", "//foo.bar/?baz=qux#quux"));
        assert!(valid("regex", "^a.*b$"));
        assert!(!valid("regex", "^(abc]"));
    }
}
