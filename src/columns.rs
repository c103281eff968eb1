//! Column vocabulary of instrument text exports.
//!
//! Maps raw column labels, exactly as written by the instrument (unit suffix
//! included), to canonical names and units. Coded columns such as the active
//! current range are decoded through [`EnumDecoder`].

use crate::error::{ExtractError, Result};
use crate::models::Scalar;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// Raw label, canonical name, unit (`None` for unitless columns)
pub const ECLAB_COLUMNS: &[(&str, &str, Option<&str>)] = &[
    ("\"Ri\"/Ohm", "'Ri'", Some("Ω")),
    ("Im(C)/nF", "Im(C)", Some("nF")),
    ("Im(Conductivity)/mS/cm", "Im(Conductivity)", Some("mS/cm")),
    ("Im(M)", "Im(M)", Some("")),
    ("Im(Permittivity)", "Im(Permittivity)", Some("")),
    ("Im(Resistivity)/Ohm.cm", "Im(Resistivity)", Some("Ω·cm")),
    ("-Im(Z)/Ohm", "-Im(Z)", Some("Ω")),
    ("-Im(Zce)/Ohm", "-Im(Zce)", Some("Ω")),
    ("-Im(Zwe-ce)/Ohm", "-Im(Zwe-ce)", Some("Ω")),
    ("(Q-Qo)/C", "(Q-Qo)", Some("C")),
    ("(Q-Qo)/mA.h", "(Q-Qo)", Some("mA·h")),
    ("<Ece>/V", "<Ece>", Some("V")),
    ("<Ewe>/V", "<Ewe>", Some("V")),
    ("<I>/mA", "<I>", Some("mA")),
    ("|C|/nF", "|C|", Some("nF")),
    ("|Conductivity|/mS/cm", "|Conductivity|", Some("mS/cm")),
    ("|Ece|/V", "|Ece|", Some("V")),
    ("|Energy|/W.h", "|Energy|", Some("W·h")),
    ("|Ewe|/V", "|Ewe|", Some("V")),
    ("|I|/A", "|I|", Some("A")),
    ("|M|", "|M|", Some("")),
    ("|Permittivity|", "|Permittivity|", Some("")),
    ("|Resistivity|/Ohm.cm", "|Resistivity|", Some("Ω·cm")),
    ("|Y|/Ohm-1", "|Y|", Some("S")),
    ("|Z|/Ohm", "|Z|", Some("Ω")),
    ("|Zce|/Ohm", "|Zce|", Some("Ω")),
    ("|Zwe-ce|/Ohm", "|Zwe-ce|", Some("Ω")),
    ("Analog IN 1/V", "Analog IN 1", Some("V")),
    ("Analog IN 2/V", "Analog IN 2", Some("V")),
    ("Capacitance charge/µF", "Capacitance charge", Some("µF")),
    ("Capacitance discharge/µF", "Capacitance discharge", Some("µF")),
    ("Capacity/mA.h", "Capacity", Some("mA·h")),
    ("charge time/s", "charge time", Some("s")),
    ("Conductivity/S.cm-1", "Conductivity", Some("S/cm")),
    ("control changes", "control changes", None),
    ("control/mA", "control_I", Some("mA")),
    ("control/V", "control_V", Some("V")),
    ("control/V/mA", "control_VI", Some("mA")),
    ("counter inc.", "counter inc.", None),
    ("Cp-2/µF-2", "Cp⁻²", Some("µF⁻²")),
    ("Cp/µF", "Cp", Some("µF")),
    ("Cs-2/µF-2", "Cs⁻²", Some("µF⁻²")),
    ("Cs/µF", "Cs", Some("µF")),
    ("cycle number", "cycle number", None),
    ("cycle time/s", "cycle time", Some("s")),
    ("d(Q-Qo)/dE/mA.h/V", "d(Q-Qo)/dE", Some("mA·h/V")),
    ("dI/dt/mA/s", "dI/dt", Some("mA/s")),
    ("discharge time/s", "discharge time", Some("s")),
    ("dQ/C", "dQ", Some("C")),
    ("dq/mA.h", "dq", Some("mA·h")),
    ("dQ/mA.h", "dQ", Some("mA·h")),
    ("Ece/V", "Ece", Some("V")),
    ("Ecell/V", "Ecell", Some("V")),
    ("Efficiency/%", "Efficiency", Some("%")),
    ("Energy charge/W.h", "Energy charge", Some("W·h")),
    ("Energy discharge/W.h", "Energy discharge", Some("W·h")),
    ("Energy/W.h", "Energy", Some("W·h")),
    ("error", "error", None),
    ("Ewe-Ece/V", "Ewe-Ece", Some("V")),
    ("Ewe/V", "Ewe", Some("V")),
    ("freq/Hz", "freq", Some("Hz")),
    ("half cycle", "half cycle", None),
    ("I Range", "I Range", None),
    ("I/mA", "I", Some("mA")),
    ("Im(Y)/Ohm-1", "Im(Y)", Some("S")),
    ("Loss Angle(Delta)/deg", "Loss Angle(Delta)", Some("deg")),
    ("mode", "mode", None),
    ("Ns changes", "Ns changes", None),
    ("Ns", "Ns", None),
    ("NSD Ewe/%", "NSD Ewe", Some("%")),
    ("NSD I/%", "NSD I", Some("%")),
    ("NSR Ewe/%", "NSR Ewe", Some("%")),
    ("NSR I/%", "NSR I", Some("%")),
    ("ox/red", "ox or red", None),
    ("P/W", "P", Some("W")),
    ("Phase(C)/deg", "Phase(C)", Some("deg")),
    ("Phase(Conductivity)/deg", "Phase(Conductivity)", Some("deg")),
    ("Phase(M)/deg", "Phase(M)", Some("deg")),
    ("Phase(Permittivity)/deg", "Phase(Permittivity)", Some("deg")),
    ("Phase(Resistivity)/deg", "Phase(Resistivity)", Some("deg")),
    ("Phase(Y)/deg", "Phase(Y)", Some("deg")),
    ("Phase(Z)/deg", "Phase(Z)", Some("deg")),
    ("Phase(Zce)/deg", "Phase(Zce)", Some("deg")),
    ("Phase(Zwe-ce)/deg", "Phase(Zwe-ce)", Some("deg")),
    ("Q charge/discharge/mA.h", "Q charge or discharge", Some("mA·h")),
    ("Q charge/mA.h", "Q charge", Some("mA·h")),
    ("Q charge/mA.h/g", "Q charge", Some("mA·h/g")),
    ("Q discharge/mA.h", "Q discharge", Some("mA·h")),
    ("Q discharge/mA.h/g", "Q discharge", Some("mA·h/g")),
    ("R/Ohm", "R", Some("Ω")),
    ("Rcmp/Ohm", "Rcmp", Some("Ω")),
    ("Re(C)/nF", "Re(C)", Some("nF")),
    ("Re(Conductivity)/mS/cm", "Re(Conductivity)", Some("mS/cm")),
    ("Re(M)", "Re(M)", Some("")),
    ("Re(Permittivity)", "Re(Permittivity)", Some("")),
    ("Re(Resistivity)/Ohm.cm", "Re(Resistivity)", Some("Ω·cm")),
    ("Re(Y)/Ohm-1", "Re(Y)", Some("S")),
    ("Re(Z)/Ohm", "Re(Z)", Some("Ω")),
    ("Re(Zce)/Ohm", "Re(Zce)", Some("Ω")),
    ("Re(Zwe-ce)/Ohm", "Re(Zwe-ce)", Some("Ω")),
    ("step time/s", "step time", Some("s")),
    ("Tan(Delta)", "Tan(Delta)", Some("")),
    ("THD Ewe/%", "THD Ewe", Some("%")),
    ("THD I/%", "THD I", Some("%")),
    ("time/s", "time", Some("s")),
    ("x", "x", None),
    ("z cycle", "z cycle", None),
];

static ECLAB_INDEX: LazyLock<HashMap<&'static str, (&'static str, Option<&'static str>)>> =
    LazyLock::new(|| {
        ECLAB_COLUMNS
            .iter()
            .map(|(raw, name, unit)| (*raw, (*name, *unit)))
            .collect()
    });

/// Look up the canonical `(name, unit)` of a raw EC-Lab column label
pub fn eclab_column(raw: &str, path: &Path) -> Result<(&'static str, Option<&'static str>)> {
    ECLAB_INDEX
        .get(raw)
        .copied()
        .ok_or_else(|| ExtractError::UnknownColumn {
            path: path.to_path_buf(),
            column: raw.to_string(),
        })
}

/// Bidirectional mapping between instrument codes and labels
#[derive(Debug, Clone, Copy)]
pub struct EnumDecoder {
    pub name: &'static str,
    entries: &'static [(i64, &'static str)],
}

/// Current ranges as coded in EC-Lab exports
pub const I_RANGE: EnumDecoder = EnumDecoder {
    name: "I_range",
    entries: &[
        (-1, "keep"),
        (0, "100 pA"),
        (1, "1 nA"),
        (2, "10 nA"),
        (3, "100 nA"),
        (4, "1 µA"),
        (5, "10 µA"),
        (6, "100 µA"),
        (7, "1 mA"),
        (8, "10 mA"),
        (9, "100 mA"),
        (10, "1 A"),
        (11, "booster"),
        (12, "Auto"),
        (13, "10 pA"),
        (14, "1 pA"),
        (15, "10 A"),
        (16, "4 A"),
        (17, "5 A"),
        (18, "2 A"),
        (19, "20 A"),
        (20, "50 A"),
        (21, "100 A"),
        (22, "200 mA"),
        (23, "500 mA"),
    ],
};

impl EnumDecoder {
    pub fn label(&self, code: i64) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| *label)
    }

    pub fn code(&self, label: &str) -> Option<i64> {
        let label = normalize_micro(label.trim());
        self.entries
            .iter()
            .find(|(_, l)| *l == label)
            .map(|(c, _)| *c)
    }

    /// Decode a parsed cell: an integer code, or a label (also given as a numeric index)
    pub fn decode(&self, value: &Scalar) -> Option<&'static str> {
        match value {
            Scalar::Int(code) => self.label(*code),
            Scalar::Float(f) if f.fract() == 0.0 => self.label(*f as i64),
            Scalar::Float(_) => None,
            Scalar::Text(text) => match text.trim().parse::<i64>() {
                Ok(code) => self.label(code),
                Err(_) => self.code(text).and_then(|c| self.label(c)),
            },
        }
    }
}

fn normalize_micro(label: &str) -> String {
    label.replace("uA", "µA").replace('μ', "µ")
}

/// Full-scale current of a range label in amperes, `None` for automatic ranging
pub fn current_range_amps(label: &str) -> Option<f64> {
    let label = normalize_micro(label.trim());
    let (magnitude, unit) = label.split_once(' ')?;
    let magnitude: f64 = magnitude.parse().ok()?;
    let prefix = unit.strip_suffix('A')?;
    let scale = match prefix {
        "p" => 1e-12,
        "n" => 1e-9,
        "µ" => 1e-6,
        "m" => 1e-3,
        "" => 1.0,
        "k" => 1e3,
        _ => return None,
    };
    Some(magnitude * scale)
}
