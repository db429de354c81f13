// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parses the INI configuration file described in spec.md §6.
//!
//! This runs on the target MCU against bytes already pulled off the FAT
//! volume by the (out of scope) filesystem collaborator, so it is a
//! small hand-rolled line parser over fixed-capacity buffers rather than
//! a host-oriented `toml`/`ini` crate built on `std::String`.

#![cfg_attr(not(test), no_std)]

pub const MAX_DEVICES: usize = 5; // 4 hdd slots + 1 ethernet
pub const MAX_FILENAME: usize = 13; // 8.3 plus NUL headroom

pub type FileName = heapless::String<MAX_FILENAME>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceKind {
    DiskFat,
    DiskRaw,
    Optical,
    LinkNuvolink,
    LinkDaynaport,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DiskMode {
    Normal,
    Fast,
    ForceFast,
    Cdrom,
}

#[derive(Clone, Debug)]
pub enum Backing {
    File(FileName),
    RawLba(u32),
}

#[derive(Clone, Debug)]
pub struct DeviceEntry {
    pub id: u8,
    pub kind: DeviceKind,
    pub backing: Backing,
    pub size_mib: Option<u32>,
    pub mode: DiskMode,
    pub mac: Option<[u8; 6]>,
    pub allow_appletalk_multicast: bool,
}

impl DeviceEntry {
    pub fn mask(&self) -> u8 {
        if self.id > 6 {
            0
        } else {
            1 << self.id
        }
    }

    pub fn enabled(&self) -> bool {
        self.id <= 6
    }
}

#[derive(Clone, Debug)]
pub struct GlobalConfig {
    pub parity: bool,
    pub debug: bool,
    pub verbose: bool,
    pub devices: heapless::Vec<DeviceEntry, MAX_DEVICES>,
}

impl GlobalConfig {
    /// The bitmap of every ID claimed by an enabled device, plus bit 7
    /// for the initiator, which is permanently reserved (spec.md §3).
    pub fn ids_in_use(&self) -> u8 {
        let mut mask = 1 << 7;
        for d in &self.devices {
            if d.enabled() {
                mask |= d.mask();
            }
        }
        mask
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Two enabled devices claim the same SCSI ID (spec.md §3 invariant).
    DuplicateId(u8),
    /// A `[hdd*]`/`[ethernet]` section is missing its mandatory `id` key.
    MissingId,
    /// A numeric key failed to parse.
    BadNumber,
    /// A boolean key was neither `yes` nor `no`.
    BadBool,
    /// `mac = ` value was not six colon-separated hex bytes.
    BadMac,
    /// More device sections than `MAX_DEVICES` were present.
    TooManyDevices,
}

#[derive(Default)]
struct Section {
    name: heapless::String<16>,
    id: Option<u8>,
    file: Option<FileName>,
    lba: Option<u32>,
    size: Option<u32>,
    mode: Option<DiskMode>,
    mac: Option<[u8; 6]>,
    protocol: Option<DeviceKind>,
    applemulti: bool,
}

fn parse_bool(v: &str) -> Result<bool, ConfigError> {
    match v.trim() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::BadBool),
    }
}

fn parse_u32(v: &str) -> Result<u32, ConfigError> {
    v.trim().parse().map_err(|_| ConfigError::BadNumber)
}

fn parse_mac(v: &str) -> Result<[u8; 6], ConfigError> {
    let mut out = [0u8; 6];
    let mut n = 0;
    for (i, part) in v.trim().split(':').enumerate() {
        if i >= 6 {
            return Err(ConfigError::BadMac);
        }
        out[i] = u8::from_str_radix(part, 16).map_err(|_| ConfigError::BadMac)?;
        n += 1;
    }
    if n != 6 {
        return Err(ConfigError::BadMac);
    }
    Ok(out)
}

fn disk_kind_for(section: &Section) -> DeviceKind {
    if section.mode == Some(DiskMode::Cdrom) {
        DeviceKind::Optical
    } else if section.lba.is_some() {
        DeviceKind::DiskRaw
    } else {
        DeviceKind::DiskFat
    }
}

/// Parses the full text of `scuznet.ini`.
pub fn parse(text: &str) -> Result<GlobalConfig, ConfigError> {
    let mut parity = false;
    let mut debug = false;
    let mut verbose = false;
    let mut sections: heapless::Vec<Section, { MAX_DEVICES + 1 }> = heapless::Vec::new();
    let mut current: Option<Section> = None;

    macro_rules! flush {
        () => {
            if let Some(s) = current.take() {
                if s.name != "scuznet" {
                    sections.push(s).map_err(|_| ConfigError::TooManyDevices)?;
                }
            }
        };
    }

    for raw_line in text.lines() {
        let line = raw_line.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            flush!();
            let name = &line[1..line.len() - 1];
            if name.eq_ignore_ascii_case("scuznet") {
                let mut s = Section::default();
                let _ = s.name.push_str("scuznet");
                current = Some(s);
            } else {
                let mut s = Section::default();
                let _ = s.name.push_str(name);
                current = Some(s);
            }
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        let in_scuznet = current
            .as_ref()
            .map(|s| s.name.as_str() == "scuznet")
            .unwrap_or(false);
        if in_scuznet {
            match key {
                "parity" => parity = parse_bool(value)?,
                "debug" => debug = parse_bool(value)?,
                "verbose" => verbose = parse_bool(value)?,
                _ => {}
            }
            continue;
        }
        let Some(section) = current.as_mut() else {
            continue;
        };
        match key {
            "id" => section.id = Some(parse_u32(value)? as u8),
            "file" => {
                let mut f = FileName::new();
                let _ = f.push_str(value);
                section.file = Some(f);
            }
            "lba" => section.lba = Some(parse_u32(value)?),
            "size" => section.size = Some(parse_u32(value)?),
            "mac" => section.mac = Some(parse_mac(value)?),
            "mode" => {
                section.mode = Some(match value {
                    "normal" => DiskMode::Normal,
                    "fast" => DiskMode::Fast,
                    "forcefast" => DiskMode::ForceFast,
                    "cdrom" => DiskMode::Cdrom,
                    _ => return Err(ConfigError::BadNumber),
                })
            }
            "protocol" | "type" => {
                section.protocol = Some(match value {
                    "nuvolink" | "nuvo" => DeviceKind::LinkNuvolink,
                    "daynaport" | "dayna" => DeviceKind::LinkDaynaport,
                    _ => return Err(ConfigError::BadNumber),
                })
            }
            "applemulti" => section.applemulti = parse_bool(value)?,
            _ => {}
        }
    }
    flush!();

    let mut devices: heapless::Vec<DeviceEntry, MAX_DEVICES> = heapless::Vec::new();
    for s in sections {
        let id = s.id.ok_or(ConfigError::MissingId)?;
        let is_ethernet = s.name.eq_ignore_ascii_case("ethernet") || s.protocol.is_some();
        let entry = if is_ethernet {
            DeviceEntry {
                id,
                kind: s.protocol.unwrap_or(DeviceKind::LinkNuvolink),
                backing: Backing::RawLba(0),
                size_mib: None,
                mode: DiskMode::Normal,
                mac: s.mac,
                allow_appletalk_multicast: s.applemulti,
            }
        } else {
            let kind = disk_kind_for(&s);
            let backing = match (s.lba, s.file) {
                (Some(lba), _) => Backing::RawLba(lba),
                (None, Some(f)) => Backing::File(f),
                (None, None) => Backing::File(FileName::new()),
            };
            DeviceEntry {
                id,
                kind,
                backing,
                size_mib: s.size,
                mode: s.mode.unwrap_or(DiskMode::Normal),
                mac: None,
                allow_appletalk_multicast: false,
            }
        };
        devices
            .push(entry)
            .map_err(|_| ConfigError::TooManyDevices)?;
    }

    // invariant: no two enabled devices share the same id (spec.md §3)
    for i in 0..devices.len() {
        for j in (i + 1)..devices.len() {
            if devices[i].enabled() && devices[i].id == devices[j].id {
                return Err(ConfigError::DuplicateId(devices[i].id));
            }
        }
    }

    Ok(GlobalConfig {
        parity,
        debug,
        verbose,
        devices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[scuznet]
debug = no
verbose = no
parity = yes

[hdd]
id = 0
file = HDD0.IMG
mode = fast

[hdd2]
id = 1
lba = 2048

[ethernet]
id = 6
mac = 00:11:22:33:44:55
protocol = nuvolink
";

    #[test]
    fn parses_sample_config() {
        let cfg = parse(SAMPLE).unwrap();
        assert!(cfg.parity);
        assert!(!cfg.debug);
        assert_eq!(cfg.devices.len(), 3);
        assert_eq!(cfg.devices[0].id, 0);
        assert_eq!(cfg.devices[0].mode, DiskMode::Fast);
        assert!(matches!(cfg.devices[1].backing, Backing::RawLba(2048)));
        assert_eq!(cfg.devices[2].kind, DeviceKind::LinkNuvolink);
        assert_eq!(cfg.devices[2].mac, Some([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let bad = "[hdd]\nid = 0\nfile = A.IMG\n[hdd2]\nid = 0\nfile = B.IMG\n";
        assert_eq!(parse(bad), Err(ConfigError::DuplicateId(0)));
    }

    #[test]
    fn ids_in_use_reserves_bit_seven() {
        let cfg = parse(SAMPLE).unwrap();
        assert_eq!(cfg.ids_in_use() & 0x80, 0x80);
    }
}
