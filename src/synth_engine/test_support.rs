//! In-memory SF2 builder for tests.

use crate::synth_engine::generators::GeneratorKind;
use crate::synth_engine::modulators::Modulator;

#[derive(Debug, Clone, Default)]
pub struct TestZone {
    pub gens: Vec<(GeneratorKind, i16)>,
    pub mods: Vec<Modulator>,
}

impl TestZone {
    pub fn new(gens: Vec<(GeneratorKind, i16)>) -> Self {
        Self {
            gens,
            mods: Vec::new(),
        }
    }

    /// Preset zone pointing at instrument `index`.
    pub fn instrument(index: i16) -> Self {
        Self::new(vec![(GeneratorKind::Instrument, index)])
    }
}

#[derive(Debug, Clone)]
pub struct TestPreset {
    pub name: String,
    pub bank: u16,
    pub number: u16,
    pub global: Option<TestZone>,
    pub zones: Vec<TestZone>,
}

#[derive(Debug, Clone)]
pub struct TestInstrument {
    pub name: String,
    pub global: Option<TestZone>,
    pub zones: Vec<TestZone>,
}

#[derive(Debug, Clone)]
pub struct TestSample {
    pub name: String,
    pub frames: Vec<i16>,
    /// Loop points relative to the first frame.
    pub loop_start: u32,
    pub loop_end: u32,
    pub sample_rate: u32,
    pub original_pitch: u8,
}

#[derive(Debug, Clone)]
pub struct TestFont {
    pub name: String,
    pub presets: Vec<TestPreset>,
    pub instruments: Vec<TestInstrument>,
    pub samples: Vec<TestSample>,
    /// Extra bytes appended to `shdr` to corrupt its size.
    pub shdr_padding: usize,
}

/// 1000 frames of a 441 Hz sine at 44.1 kHz: exactly ten periods.
pub fn sine_sample() -> TestSample {
    let frames = (0..1000)
        .map(|i| {
            let phase = i as f32 * 441.0 / 44_100.0;
            ((phase * std::f32::consts::TAU).sin() * 0.8 * 32_767.0).round() as i16
        })
        .collect();
    TestSample {
        name: "Sine".to_string(),
        frames,
        loop_start: 0,
        loop_end: 1000,
        sample_rate: 44_100,
        original_pitch: 60,
    }
}

/// One preset "Grand Piano" (0/0) over one looping instrument with a 0.2 s release.
pub fn piano_font() -> TestFont {
    TestFont {
        name: "Test Font".to_string(),
        presets: vec![TestPreset {
            name: "Grand Piano".to_string(),
            bank: 0,
            number: 0,
            global: None,
            zones: vec![TestZone::instrument(0)],
        }],
        instruments: vec![TestInstrument {
            name: "Piano".to_string(),
            global: Some(TestZone::new(vec![(GeneratorKind::ReleaseVolEnv, -2786)])),
            zones: vec![TestZone::new(vec![
                (GeneratorKind::SampleModes, 1),
                (GeneratorKind::SampleId, 0),
            ])],
        }],
        samples: vec![sine_sample()],
        shdr_padding: 0,
    }
}

pub fn piano_sf2() -> Vec<u8> {
    piano_font().to_bytes()
}

/// The piano plus a "Standard Kit" (128/0) whose hi-hats on keys 42 and 46
/// share exclusive class 1.
pub fn drum_kit_sf2() -> Vec<u8> {
    let mut font = piano_font();
    let hat = |key: i16| {
        TestZone::new(vec![
            (GeneratorKind::KeyRange, i16::from_le_bytes([key as u8, key as u8])),
            (GeneratorKind::ExclusiveClass, 1),
            (GeneratorKind::SampleModes, 1),
            (GeneratorKind::SampleId, 0),
        ])
    };
    font.instruments.push(TestInstrument {
        name: "Hats".to_string(),
        global: None,
        zones: vec![hat(42), hat(46)],
    });
    font.add_preset("Standard Kit", 128, 0, vec![TestZone::instrument(1)]);
    font.to_bytes()
}

/// A 16-bit PCM WAV stream with interleaved `frames`.
pub fn pcm_wav(channels: u16, sample_rate: u32, frames: &[i16]) -> Vec<u8> {
    let block_align = channels * 2;
    let mut fmt = Vec::with_capacity(16);
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    fmt.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let data: Vec<u8> = frames.iter().flat_map(|s| s.to_le_bytes()).collect();
    let mut body = b"WAVE".to_vec();
    body.extend_from_slice(&chunk(b"fmt ", &fmt));
    body.extend_from_slice(&chunk(b"data", &data));
    chunk(b"RIFF", &body)
}

/// Offset of the first chunk header with `id`.
pub fn find_chunk(bytes: &[u8], id: &[u8; 4]) -> usize {
    bytes
        .windows(4)
        .position(|w| w == id)
        .expect("chunk not found")
}

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 9);
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list(list_type: &[u8; 4], chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut body = list_type.to_vec();
    for c in chunks {
        body.extend_from_slice(c);
    }
    chunk(b"LIST", &body)
}

fn name20(name: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    let bytes = name.as_bytes();
    let len = bytes.len().min(20);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// Bag, modulator and generator tables for one hydra level.
#[derive(Default)]
struct ZoneWriter {
    bags: Vec<u8>,
    mods: Vec<u8>,
    gens: Vec<u8>,
    bag_count: u16,
    mod_count: u16,
    gen_count: u16,
}

impl ZoneWriter {
    fn push(&mut self, zone: &TestZone) {
        self.bags.extend_from_slice(&self.gen_count.to_le_bytes());
        self.bags.extend_from_slice(&self.mod_count.to_le_bytes());
        self.bag_count += 1;
        for m in &zone.mods {
            for field in [m.source, m.destination, m.amount as u16, m.amount_source, m.transform] {
                self.mods.extend_from_slice(&field.to_le_bytes());
            }
            self.mod_count += 1;
        }
        for &(kind, amount) in &zone.gens {
            self.gens.extend_from_slice(&(kind as u16).to_le_bytes());
            self.gens.extend_from_slice(&amount.to_le_bytes());
            self.gen_count += 1;
        }
    }

    fn push_all(&mut self, global: &Option<TestZone>, zones: &[TestZone]) -> u16 {
        let first = self.bag_count;
        if let Some(global) = global {
            self.push(global);
        }
        for zone in zones {
            self.push(zone);
        }
        first
    }

    /// Appends the terminal records.
    fn finish(mut self) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        self.bags.extend_from_slice(&self.gen_count.to_le_bytes());
        self.bags.extend_from_slice(&self.mod_count.to_le_bytes());
        self.mods.extend_from_slice(&[0u8; 10]);
        self.gens.extend_from_slice(&[0u8; 4]);
        (self.bags, self.mods, self.gens)
    }
}

impl TestFont {
    pub fn add_preset(&mut self, name: &str, bank: u16, number: u16, zones: Vec<TestZone>) {
        self.presets.push(TestPreset {
            name: name.to_string(),
            bank,
            number,
            global: None,
            zones,
        });
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let info = list(
            b"INFO",
            &[
                chunk(b"ifil", &[2, 0, 1, 0]),
                chunk(b"INAM", format!("{}\0", self.name).as_bytes()),
            ],
        );

        let mut smpl = Vec::new();
        let mut shdr = Vec::new();
        let mut frame = 0u32;
        for sample in &self.samples {
            let start = frame;
            for s in &sample.frames {
                smpl.extend_from_slice(&s.to_le_bytes());
            }
            frame += sample.frames.len() as u32;
            let end = frame;
            // 46 zero frames after every sample.
            smpl.extend_from_slice(&[0u8; 92]);
            frame += 46;

            shdr.extend_from_slice(&name20(&sample.name));
            for field in [
                start,
                end,
                start + sample.loop_start,
                start + sample.loop_end,
                sample.sample_rate,
            ] {
                shdr.extend_from_slice(&field.to_le_bytes());
            }
            shdr.push(sample.original_pitch);
            shdr.push(0);
            shdr.extend_from_slice(&0u16.to_le_bytes());
            shdr.extend_from_slice(&1u16.to_le_bytes());
        }
        shdr.extend_from_slice(&name20("EOS"));
        shdr.extend_from_slice(&[0u8; 26]);
        shdr.extend(std::iter::repeat_n(0u8, self.shdr_padding));
        let sdta = list(b"sdta", &[chunk(b"smpl", &smpl)]);

        let mut inst = Vec::new();
        let mut instrument_zones = ZoneWriter::default();
        for instrument in &self.instruments {
            let bag = instrument_zones.push_all(&instrument.global, &instrument.zones);
            inst.extend_from_slice(&name20(&instrument.name));
            inst.extend_from_slice(&bag.to_le_bytes());
        }
        inst.extend_from_slice(&name20("EOI"));
        inst.extend_from_slice(&instrument_zones.bag_count.to_le_bytes());
        let (ibag, imod, igen) = instrument_zones.finish();

        let mut phdr = Vec::new();
        let mut preset_zones = ZoneWriter::default();
        for preset in &self.presets {
            let bag = preset_zones.push_all(&preset.global, &preset.zones);
            phdr.extend_from_slice(&name20(&preset.name));
            phdr.extend_from_slice(&preset.number.to_le_bytes());
            phdr.extend_from_slice(&preset.bank.to_le_bytes());
            phdr.extend_from_slice(&bag.to_le_bytes());
            phdr.extend_from_slice(&[0u8; 12]);
        }
        phdr.extend_from_slice(&name20("EOP"));
        phdr.extend_from_slice(&[0u8; 4]);
        phdr.extend_from_slice(&preset_zones.bag_count.to_le_bytes());
        phdr.extend_from_slice(&[0u8; 12]);
        let (pbag, pmod, pgen) = preset_zones.finish();

        let pdta = list(
            b"pdta",
            &[
                chunk(b"phdr", &phdr),
                chunk(b"pbag", &pbag),
                chunk(b"pmod", &pmod),
                chunk(b"pgen", &pgen),
                chunk(b"inst", &inst),
                chunk(b"ibag", &ibag),
                chunk(b"imod", &imod),
                chunk(b"igen", &igen),
                chunk(b"shdr", &shdr),
            ],
        );

        let mut body = b"sfbk".to_vec();
        body.extend_from_slice(&info);
        body.extend_from_slice(&sdta);
        body.extend_from_slice(&pdta);
        chunk(b"RIFF", &body)
    }
}
