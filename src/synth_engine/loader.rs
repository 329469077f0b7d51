//! SoundFont parsing.
//!
//! Turns the raw `RIFF/sfbk` container into [`SoundFontData`]: info strings,
//! the normalized sample pool and the preset/instrument/sample hydra with every
//! cross-table reference validated. Compressed SF3 samples are decoded here too.

use std::path::Path;

use crate::synth_engine::constants::DEFAULT_SAMPLE_RATE;
use crate::synth_engine::errors::LoadError;
use crate::synth_engine::font::{Instrument, Preset, Sample, SoundFontData, Zone};
use crate::synth_engine::generators::{Generator, GeneratorKind, Range};
use crate::synth_engine::modulators::Modulator;
use crate::synth_engine::riff::{self, fourcc};
use crate::synth_engine::sf3::{SAMPLE_TYPE_COMPRESSED, decode_compressed_sample};

const PHDR_RECORD: usize = 38;
const BAG_RECORD: usize = 4;
const MOD_RECORD: usize = 10;
const GEN_RECORD: usize = 4;
const INST_RECORD: usize = 22;
const SHDR_RECORD: usize = 46;
const NAME_LEN: usize = 20;

/// Reads and parses a SoundFont file.
pub fn load_file(path: &Path) -> Result<SoundFontData, LoadError> {
    let data = std::fs::read(path)?;
    load_bytes(&data)
}

/// Parses a SoundFont held in memory.
///
/// # Errors
///
/// - [`LoadError::Signature`] when the data is not a `RIFF/sfbk` file
/// - [`LoadError::Truncated`] when a chunk runs past the end of the data
/// - [`LoadError::MissingChunk`] when `smpl` or a hydra table is absent
/// - [`LoadError::TableSize`], [`LoadError::IndexOutOfRange`] and
///   [`LoadError::SampleRange`] for inconsistent hydra tables
/// - [`LoadError::NoPresets`] when the preset table holds only its terminator
pub fn load_bytes(data: &[u8]) -> Result<SoundFontData, LoadError> {
    let body = riff::read_form(data, b"sfbk")?;

    let mut name = String::new();
    let mut version = (0, 0);
    let mut smpl: Option<&[u8]> = None;
    let mut sm24: Option<&[u8]> = None;
    let mut hydra = HydraChunks::default();

    for chunk in riff::read_chunks(body)? {
        let Some((list_type, list_body)) = chunk.as_list() else {
            log::debug!("Ignoring top-level chunk '{}'", fourcc(&chunk.id));
            continue;
        };
        match &list_type {
            b"INFO" => {
                for info in riff::read_chunks(list_body)? {
                    match &info.id {
                        b"INAM" => name = read_name(info.data),
                        b"ifil" if info.data.len() >= 4 => {
                            version = (read_u16(info.data, 0), read_u16(info.data, 2));
                        }
                        _ => {}
                    }
                }
            }
            b"sdta" => {
                for sdta in riff::read_chunks(list_body)? {
                    match &sdta.id {
                        b"smpl" => smpl = Some(sdta.data),
                        b"sm24" => sm24 = Some(sdta.data),
                        _ => {}
                    }
                }
            }
            b"pdta" => {
                for table in riff::read_chunks(list_body)? {
                    hydra.insert(table.id, table.data);
                }
            }
            _ => log::debug!("Ignoring LIST '{}'", fourcc(&list_type)),
        }
    }

    let smpl = smpl.ok_or(LoadError::MissingChunk("smpl"))?;

    let shdr = records(required(hydra.shdr, "shdr")?, "shdr", SHDR_RECORD)?;
    let sample_headers: Vec<SampleHeader> = shdr[..shdr.len() - 1]
        .iter()
        .map(|r| SampleHeader::parse(r))
        .collect();
    let (samples, pool) = build_samples(&sample_headers, smpl, sm24)?;

    let inst = records(required(hydra.inst, "inst")?, "inst", INST_RECORD)?;
    let instrument_tables = ZoneTables::parse(
        required(hydra.ibag, "ibag")?,
        required(hydra.imod, "imod")?,
        required(hydra.igen, "igen")?,
        ["ibag", "imod", "igen"],
        GeneratorKind::SampleId,
        samples.len(),
    )?;
    let mut instruments = Vec::with_capacity(inst.len() - 1);
    for (i, pair) in inst.windows(2).enumerate() {
        let inst_name = read_name(&pair[0][..NAME_LEN]);
        let bag_start = read_u16(pair[0], NAME_LEN) as usize;
        let bag_end = read_u16(pair[1], NAME_LEN) as usize;
        let (global, zones) = instrument_tables.zones("inst", i, &inst_name, bag_start, bag_end)?;
        instruments.push(Instrument {
            name: inst_name,
            global,
            zones,
        });
    }

    let phdr = records(required(hydra.phdr, "phdr")?, "phdr", PHDR_RECORD)?;
    if phdr.len() < 2 {
        return Err(LoadError::NoPresets);
    }
    let preset_tables = ZoneTables::parse(
        required(hydra.pbag, "pbag")?,
        required(hydra.pmod, "pmod")?,
        required(hydra.pgen, "pgen")?,
        ["pbag", "pmod", "pgen"],
        GeneratorKind::Instrument,
        instruments.len(),
    )?;
    let mut presets = Vec::with_capacity(phdr.len() - 1);
    for (i, pair) in phdr.windows(2).enumerate() {
        let preset_name = read_name(&pair[0][..NAME_LEN]);
        let number = read_u16(pair[0], 20);
        let bank = read_u16(pair[0], 22);
        let bag_start = read_u16(pair[0], 24) as usize;
        let bag_end = read_u16(pair[1], 24) as usize;
        let (global, zones) = preset_tables.zones("phdr", i, &preset_name, bag_start, bag_end)?;
        presets.push(Preset {
            name: preset_name,
            bank,
            number,
            global,
            zones,
        });
    }
    presets.sort_by_key(|p| (p.bank, p.number));

    log::info!(
        "Loaded SoundFont '{}' (version {}.{}): {} presets, {} instruments, {} samples, {} frames",
        name,
        version.0,
        version.1,
        presets.len(),
        instruments.len(),
        samples.len(),
        pool.len()
    );

    Ok(SoundFontData {
        name,
        version,
        presets,
        instruments,
        samples,
        pool,
    })
}

#[derive(Default)]
struct HydraChunks<'a> {
    phdr: Option<&'a [u8]>,
    pbag: Option<&'a [u8]>,
    pmod: Option<&'a [u8]>,
    pgen: Option<&'a [u8]>,
    inst: Option<&'a [u8]>,
    ibag: Option<&'a [u8]>,
    imod: Option<&'a [u8]>,
    igen: Option<&'a [u8]>,
    shdr: Option<&'a [u8]>,
}

impl<'a> HydraChunks<'a> {
    fn insert(&mut self, id: [u8; 4], data: &'a [u8]) {
        let slot = match &id {
            b"phdr" => &mut self.phdr,
            b"pbag" => &mut self.pbag,
            b"pmod" => &mut self.pmod,
            b"pgen" => &mut self.pgen,
            b"inst" => &mut self.inst,
            b"ibag" => &mut self.ibag,
            b"imod" => &mut self.imod,
            b"igen" => &mut self.igen,
            b"shdr" => &mut self.shdr,
            _ => {
                log::debug!("Ignoring pdta chunk '{}'", fourcc(&id));
                return;
            }
        };
        *slot = Some(data);
    }
}

fn required<'a>(chunk: Option<&'a [u8]>, id: &'static str) -> Result<&'a [u8], LoadError> {
    chunk.ok_or(LoadError::MissingChunk(id))
}

/// Splits a hydra table into records; a table must hold at least its terminator.
fn records<'a>(
    data: &'a [u8],
    table: &'static str,
    record_size: usize,
) -> Result<Vec<&'a [u8]>, LoadError> {
    if data.len() < record_size || data.len() % record_size != 0 {
        return Err(LoadError::TableSize {
            table,
            size: data.len(),
            record_size,
        });
    }
    Ok(data.chunks_exact(record_size).collect())
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Reads a NUL-padded ASCII name.
fn read_name(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim_end().to_string()
}

/// Bag, modulator and generator tables of one hydra level.
struct ZoneTables {
    tables: [&'static str; 3],
    bags: Vec<(usize, usize)>,
    modulators: Vec<Modulator>,
    generators: Vec<(u16, i16)>,
    link: GeneratorKind,
    link_limit: usize,
}

impl ZoneTables {
    fn parse(
        bag: &[u8],
        modulators: &[u8],
        generators: &[u8],
        tables: [&'static str; 3],
        link: GeneratorKind,
        link_limit: usize,
    ) -> Result<Self, LoadError> {
        let bags = records(bag, tables[0], BAG_RECORD)?
            .into_iter()
            .map(|r| (read_u16(r, 0) as usize, read_u16(r, 2) as usize))
            .collect();
        let modulators = records(modulators, tables[1], MOD_RECORD)?
            .into_iter()
            .map(Modulator::from_record)
            .collect();
        let generators = records(generators, tables[2], GEN_RECORD)?
            .into_iter()
            .map(|r| (read_u16(r, 0), read_u16(r, 2) as i16))
            .collect();
        Ok(Self {
            tables,
            bags,
            modulators,
            generators,
            link,
            link_limit,
        })
    }

    /// Builds the zones of one header, splitting off its global zone.
    fn zones(
        &self,
        owner: &'static str,
        record: usize,
        owner_name: &str,
        bag_start: usize,
        bag_end: usize,
    ) -> Result<(Option<Zone>, Vec<Zone>), LoadError> {
        let bag_limit = self.bags.len() - 1;
        if bag_end > bag_limit {
            return Err(LoadError::IndexOutOfRange {
                table: owner,
                record: record + 1,
                index: bag_end,
                limit: bag_limit,
            });
        }
        if bag_start > bag_end {
            return Err(LoadError::IndexOutOfRange {
                table: owner,
                record,
                index: bag_start,
                limit: bag_end,
            });
        }

        let mut global = None;
        let mut zones = Vec::with_capacity(bag_end - bag_start);
        for bag in bag_start..bag_end {
            let zone = self.zone(bag)?;
            if zone.link.is_some() {
                zones.push(zone);
            } else if bag == bag_start {
                global = Some(zone);
            } else {
                log::warn!(
                    "Dropping zone {} of '{}': no {:?} generator",
                    bag - bag_start,
                    owner_name,
                    self.link
                );
            }
        }
        Ok((global, zones))
    }

    fn zone(&self, bag: usize) -> Result<Zone, LoadError> {
        let (gen_start, mod_start) = self.bags[bag];
        let (gen_end, mod_end) = self.bags[bag + 1];
        self.check_span(self.tables[2], bag, gen_start, gen_end, self.generators.len())?;
        self.check_span(self.tables[1], bag, mod_start, mod_end, self.modulators.len())?;

        let mut zone = Zone {
            modulators: self.modulators[mod_start..mod_end].to_vec(),
            ..Zone::default()
        };

        for (offset, &(op, amount)) in self.generators[gen_start..gen_end].iter().enumerate() {
            match GeneratorKind::from_raw(op) {
                Some(GeneratorKind::KeyRange) => zone.key_range = Some(Range::from_amount(amount)),
                Some(GeneratorKind::VelRange) => zone.vel_range = Some(Range::from_amount(amount)),
                Some(kind) if kind == self.link => {
                    let index = amount as u16 as usize;
                    if index >= self.link_limit {
                        return Err(LoadError::IndexOutOfRange {
                            table: self.tables[2],
                            record: gen_start + offset,
                            index,
                            limit: self.link_limit,
                        });
                    }
                    // Generators after the terminal link are ignored.
                    zone.link = Some(index);
                    break;
                }
                Some(GeneratorKind::Instrument | GeneratorKind::SampleId) => {}
                Some(kind) => zone.generators.push(Generator { kind, amount }),
                None => {}
            }
        }

        Ok(zone)
    }

    fn check_span(
        &self,
        table: &'static str,
        bag: usize,
        start: usize,
        end: usize,
        limit: usize,
    ) -> Result<(), LoadError> {
        if end > limit {
            return Err(LoadError::IndexOutOfRange {
                table,
                record: bag,
                index: end,
                limit,
            });
        }
        if start > end {
            return Err(LoadError::IndexOutOfRange {
                table,
                record: bag,
                index: start,
                limit: end,
            });
        }
        Ok(())
    }
}

struct SampleHeader {
    name: String,
    start: u32,
    end: u32,
    loop_start: u32,
    loop_end: u32,
    sample_rate: u32,
    original_pitch: u8,
    pitch_correction: i8,
    sample_type: u16,
}

impl SampleHeader {
    fn parse(record: &[u8]) -> Self {
        Self {
            name: read_name(&record[..NAME_LEN]),
            start: read_u32(record, 20),
            end: read_u32(record, 24),
            loop_start: read_u32(record, 28),
            loop_end: read_u32(record, 32),
            sample_rate: read_u32(record, 36),
            original_pitch: record[40],
            pitch_correction: record[41] as i8,
            sample_type: read_u16(record, 44),
        }
    }

    fn is_compressed(&self) -> bool {
        self.sample_type & SAMPLE_TYPE_COMPRESSED != 0
    }

    fn to_sample(&self, start: usize, end: usize, loop_start: usize, loop_end: usize) -> Sample {
        let sample_rate = if self.sample_rate == 0 {
            log::warn!(
                "Sample '{}' has no sample rate, assuming {} Hz",
                self.name,
                DEFAULT_SAMPLE_RATE
            );
            DEFAULT_SAMPLE_RATE
        } else {
            self.sample_rate
        };
        Sample {
            name: self.name.clone(),
            start,
            end,
            loop_start,
            loop_end,
            sample_rate,
            original_pitch: self.original_pitch,
            pitch_correction: self.pitch_correction,
            sample_type: self.sample_type,
        }
    }
}

/// Converts 16-bit PCM (optionally extended by the `sm24` low bytes) to floats.
fn decode_pcm(smpl: &[u8], sm24: Option<&[u8]>) -> Vec<f32> {
    let frames = smpl.len() / 2;
    let low_bytes = match sm24 {
        Some(low) if low.len() >= frames => Some(low),
        Some(low) => {
            log::warn!(
                "Ignoring sm24 chunk of {} bytes for {} sample frames",
                low.len(),
                frames
            );
            None
        }
        None => None,
    };

    smpl.chunks_exact(2)
        .enumerate()
        .map(|(i, bytes)| {
            let high = i16::from_le_bytes([bytes[0], bytes[1]]);
            match low_bytes {
                Some(low) => (((high as i32) << 8) | low[i] as i32) as f32 / 8_388_608.0,
                None => high as f32 / 32_768.0,
            }
        })
        .collect()
}

fn build_samples(
    headers: &[SampleHeader],
    smpl: &[u8],
    sm24: Option<&[u8]>,
) -> Result<(Vec<Sample>, Vec<f32>), LoadError> {
    let pcm = decode_pcm(smpl, sm24);

    if !headers.iter().any(SampleHeader::is_compressed) {
        let mut samples = Vec::with_capacity(headers.len());
        for header in headers {
            let (start, end) = (header.start as usize, header.end as usize);
            if start > end || end > pcm.len() {
                return Err(LoadError::SampleRange {
                    name: header.name.clone(),
                    start,
                    end,
                    pool: pcm.len(),
                });
            }
            let (loop_start, loop_end) = (header.loop_start as usize, header.loop_end as usize);
            samples.push(header.to_sample(start, end, loop_start, loop_end));
        }
        return Ok((samples, pcm));
    }

    // SF3: compressed samples address bytes of `smpl` and carry loop points
    // relative to their own first frame. Everything is rebuilt into a fresh pool.
    let mut pool = Vec::new();
    let mut samples = Vec::with_capacity(headers.len());
    for header in headers {
        let (start, end) = (header.start as usize, header.end as usize);
        let new_start = pool.len();
        let (loop_start, loop_end) = if header.is_compressed() {
            if start > end || end > smpl.len() {
                return Err(LoadError::SampleRange {
                    name: header.name.clone(),
                    start,
                    end,
                    pool: smpl.len(),
                });
            }
            pool.extend(decode_compressed_sample(&header.name, &smpl[start..end])?);
            (
                new_start + header.loop_start as usize,
                new_start + header.loop_end as usize,
            )
        } else {
            if start > end || end > pcm.len() {
                return Err(LoadError::SampleRange {
                    name: header.name.clone(),
                    start,
                    end,
                    pool: pcm.len(),
                });
            }
            pool.extend_from_slice(&pcm[start..end]);
            (
                new_start + (header.loop_start as usize).saturating_sub(start),
                new_start + (header.loop_end as usize).saturating_sub(start),
            )
        };
        samples.push(header.to_sample(new_start, pool.len(), loop_start, loop_end));
    }
    Ok((samples, pool))
}
