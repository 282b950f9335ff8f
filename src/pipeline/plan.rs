//! Pipeline plans.
//!
//! A plan is the ordered list of steps for one material. All inputs and
//! outputs live flat in the material's working directory and differ only by
//! suffix.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::deck::{Deck, ParamValue, Section};
use crate::error::PipelineError;
use crate::runner::{absolute_dir, StageKind};

/// Energy window written (disabled) into the DOS and PDOS decks.
const ENERGY_WINDOW: (i64, i64) = (-10, 35);

/// Energy grid step in eV for DOS and PDOS.
const DELTA_E: f64 = 0.1;

/// One solver invocation in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStep {
    /// Unique step name (e.g. `scf`, `bands-pp-up`).
    pub name: String,
    pub kind: StageKind,
    /// Working directory of the process.
    pub workdir: PathBuf,
    /// Input deck, relative to `workdir`.
    pub input: PathBuf,
    /// Output file, relative to `workdir`.
    pub output: PathBuf,
    /// Deck written to `input` before the step runs. Steps without one
    /// expect a ready-made input file.
    #[serde(skip)]
    pub deck: Option<Deck>,
}

impl StageStep {
    pub fn new(
        name: impl Into<String>,
        kind: StageKind,
        workdir: impl Into<PathBuf>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            workdir: workdir.into(),
            input: input.into(),
            output: output.into(),
            deck: None,
        }
    }

    pub fn with_deck(mut self, deck: Deck) -> Self {
        self.deck = Some(deck);
        self
    }

    pub fn input_path(&self) -> PathBuf {
        self.workdir.join(&self.input)
    }

    pub fn output_path(&self) -> PathBuf {
        self.workdir.join(&self.output)
    }
}

/// Ordered steps for one material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelinePlan {
    pub prefix: String,
    pub workdir: PathBuf,
    pub steps: Vec<StageStep>,
}

impl PipelinePlan {
    /// Empty plan; steps are added with [`PipelinePlan::push`].
    ///
    /// A relative `workdir` is anchored at the current directory.
    pub fn new(workdir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            workdir: absolute_dir(&workdir.into()),
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: StageStep) {
        self.steps.push(step);
    }

    /// The band-structure workflow:
    ///
    /// 1. `scf`, `bands` (pw.x, ready-made `.pwi` decks)
    /// 2. `bands-pp-flat`, `bands-pp-up`, `bands-pp-down` (bands.x)
    /// 3. `nscf` (pw.x, ready-made deck)
    /// 4. `dos` (dos.x), `pdos` (projwfc.x)
    ///
    /// Post-processing decks point `outdir` at the working directory.
    pub fn band_structure(workdir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        let mut plan = Self::new(workdir, prefix);
        let outdir = plan.workdir.display().to_string();
        let prefix = plan.prefix.clone();

        for name in ["scf", "bands"] {
            plan.push(plan.pw_step(name));
        }

        // Spin component 0 is the solver default and is left out of the deck.
        for (variant, spin) in [("flat", None), ("up", Some(1)), ("down", Some(2))] {
            let name = format!("bands-pp-{}", variant);
            let deck = Deck::new().with_section(
                Section::new("bands")
                    .param("outdir", outdir.as_str())
                    .param("prefix", prefix.as_str())
                    .param("filband", format!("{}-bands.dat", prefix))
                    .param("spin_component", ParamValue::from(spin)),
            );
            plan.push(plan.post_step(&name, StageKind::Bands).with_deck(deck));
        }

        plan.push(plan.pw_step("nscf"));

        let dos = Section::new("dos")
            .param("outdir", outdir.as_str())
            .param("prefix", prefix.as_str())
            .param("fildos", format!("{}-dos.dat", prefix))
            .param("DeltaE", DELTA_E)
            .param("!emin", ENERGY_WINDOW.0)
            .param("!emax", ENERGY_WINDOW.1);
        plan.push(
            plan.post_step("dos", StageKind::Dos)
                .with_deck(Deck::new().with_section(dos)),
        );

        let projwfc = Section::new("projwfc")
            .param("outdir", outdir.as_str())
            .param("prefix", prefix.as_str())
            .param("filpdos", format!("{}-pdos.dat", prefix))
            .param("DeltaE", DELTA_E)
            .param("ngauss", 1)
            .param("degauss", 0.02)
            .param("!emin", ENERGY_WINDOW.0)
            .param("!emax", ENERGY_WINDOW.1);
        plan.push(
            plan.post_step("pdos", StageKind::Pdos)
                .with_deck(Deck::new().with_section(projwfc)),
        );

        plan
    }

    /// Drops the steps before `name`, to resume a halted run.
    pub fn starting_at(mut self, name: &str) -> Result<Self, PipelineError> {
        let index = self
            .steps
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| PipelineError::UnknownStep(name.to_string()))?;
        self.steps.drain(..index);
        Ok(self)
    }

    pub fn step(&self, name: &str) -> Option<&StageStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Where the run summary is written.
    pub fn summary_path(&self) -> PathBuf {
        summary_path(&self.workdir, &self.prefix)
    }

    fn pw_step(&self, name: &str) -> StageStep {
        StageStep::new(
            name,
            StageKind::Pw,
            &self.workdir,
            format!("{}.{}.pwi", self.prefix, name),
            format!("{}.{}.pwo", self.prefix, name),
        )
    }

    fn post_step(&self, name: &str, kind: StageKind) -> StageStep {
        StageStep::new(
            name,
            kind,
            &self.workdir,
            format!("{}.{}.in", self.prefix, name),
            format!("{}.{}.out", self.prefix, name),
        )
    }
}

/// `<workdir>/<prefix>.pipeline.json`.
pub fn summary_path(workdir: &Path, prefix: &str) -> PathBuf {
    workdir.join(format!("{}.pipeline.json", prefix))
}
