use pyo3::pymodule;

mod messages;
mod soundfont;
mod synth;
mod synth_engine;

/// SoundFont synthesizer implemented in Rust.
#[pymodule]
mod _tinysoundfont {
    use pyo3::prelude::*;

    #[pymodule_export]
    use super::soundfont::OutputMode;

    #[pymodule_export]
    use super::soundfont::SoundFont;

    #[pymodule_export]
    use super::synth::Synth;

    #[pymodule_init]
    fn init(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add(
            "SoundFontException",
            m.py().get_type::<super::soundfont::SoundFontException>(),
        )
    }
}
