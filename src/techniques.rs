//! Parameter catalog of EC-Lab techniques.
//!
//! The settings block of a text export lists one fixed-width line per
//! technique parameter. Which parameters appear, and in which order, depends
//! on the technique and on the EC-Lab version that wrote the file, so each
//! technique carries one or more layouts identified by their line labels.

use crate::error::{ExtractError, Result};
use std::path::Path;

/// Width of the label column and of every sequence column in the settings block
pub const SETTINGS_COLUMN_WIDTH: usize = 20;

/// One known ordering of parameter lines
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub variant: &'static str,
    /// `(label as printed, parameter key)` in file order
    pub params: &'static [(&'static str, &'static str)],
}

impl Layout {
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().map(|(_, key)| *key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Whether the trailing settings lines carry exactly this layout's labels
    fn matches(&self, lines: &[&str]) -> bool {
        if lines.len() < self.params.len() {
            return false;
        }
        let tail = &lines[lines.len() - self.params.len()..];
        tail.iter()
            .zip(self.params)
            .all(|(line, (label, _))| line_label(line) == *label)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Technique {
    /// Short identifier stored in the settings
    pub name: &'static str,
    /// Technique title as printed in the header
    pub title: &'static str,
    pub layouts: &'static [Layout],
}

const E_RANGE: [(&str, &str); 2] = [
    ("E range min (V)", "E_range_min"),
    ("E range max (V)", "E_range_max"),
];

pub const CATALOG: &[Technique] = &[
    Technique {
        name: "OCV",
        title: "Open Circuit Voltage",
        layouts: &[Layout {
            variant: "OCV",
            params: &[
                ("tR (h:m:s)", "t_R"),
                ("dER/dt (mV/h)", "dE_R/dt"),
                ("record", "record"),
                ("dER (mV)", "dE_R"),
                ("dtR (s)", "dt_R"),
                E_RANGE[0],
                E_RANGE[1],
            ],
        }],
    },
    Technique {
        name: "CA",
        title: "Chronoamperometry / Chronocoulometry",
        layouts: &[Layout {
            variant: "CA",
            params: &[
                ("Ei (V)", "E_i"),
                ("vs.", "E_i_vs"),
                ("ti (h:m:s)", "t_i"),
                ("Imax", "I_max"),
                ("unit Imax", "I_max_unit"),
                ("Imin", "I_min"),
                ("unit Imin", "I_min_unit"),
                ("dQM", "dQ_M"),
                ("unit dQM", "dQ_M_unit"),
                ("record", "record"),
                ("dI", "dI"),
                ("unit dI", "dI_unit"),
                ("dt (s)", "dt"),
                E_RANGE[0],
                E_RANGE[1],
                ("I Range", "I_range"),
                ("Bandwidth", "bandwidth"),
                ("goto Ns'", "goto_Ns"),
                ("nc cycles", "nc_cycles"),
            ],
        }],
    },
    Technique {
        name: "CP",
        title: "Chronopotentiometry",
        layouts: &[
            Layout {
                variant: "CP (apply I/C)",
                params: &[
                    ("apply I/C", "apply_I/C"),
                    ("Is", "I_s"),
                    ("unit Is", "I_s_unit"),
                    ("vs.", "I_s_vs"),
                    ("ts (h:m:s)", "t_s"),
                    ("EM (V)", "E_M"),
                    ("dQM", "dQ_M"),
                    ("unit dQM", "dQ_M_unit"),
                    ("record", "record"),
                    ("dEs (mV)", "dE_s"),
                    ("dts (s)", "dt_s"),
                    E_RANGE[0],
                    E_RANGE[1],
                    ("I Range", "I_range"),
                    ("Bandwidth", "bandwidth"),
                    ("goto Ns'", "goto_Ns"),
                    ("nc cycles", "nc_cycles"),
                ],
            },
            Layout {
                variant: "CP",
                params: &[
                    ("Is", "I_s"),
                    ("unit Is", "I_s_unit"),
                    ("vs.", "I_s_vs"),
                    ("ts (h:m:s)", "t_s"),
                    ("EM (V)", "E_M"),
                    ("dQM", "dQ_M"),
                    ("unit dQM", "dQ_M_unit"),
                    ("record", "record"),
                    ("dEs (mV)", "dE_s"),
                    ("dts (s)", "dt_s"),
                    E_RANGE[0],
                    E_RANGE[1],
                    ("I Range", "I_range"),
                    ("Bandwidth", "bandwidth"),
                    ("goto Ns'", "goto_Ns"),
                    ("nc cycles", "nc_cycles"),
                ],
            },
        ],
    },
    Technique {
        name: "CV",
        title: "Cyclic Voltammetry",
        layouts: &[Layout {
            variant: "CV",
            params: &[
                ("Ei (V)", "E_i"),
                ("vs.", "E_i_vs"),
                ("dE/dt", "dE/dt"),
                ("dE/dt unit", "dE/dt_unit"),
                ("E1 (V)", "E_1"),
                ("vs.", "E_1_vs"),
                ("E2 (V)", "E_2"),
                ("vs.", "E_2_vs"),
                ("nc cycles", "nc_cycles"),
                ("Reverse scan", "reverse_scan"),
                ("Ef (V)", "E_f"),
                ("vs.", "E_f_vs"),
                ("Average over dE", "average_over_dE"),
                ("Record", "record"),
                E_RANGE[0],
                E_RANGE[1],
                ("I Range", "I_range"),
                ("I Range init", "I_range_init"),
                ("Bandwidth", "bandwidth"),
            ],
        }],
    },
    Technique {
        name: "LSV",
        title: "Linear Sweep Voltammetry",
        layouts: &[Layout {
            variant: "LSV",
            params: &[
                ("tR (h:m:s)", "t_R"),
                ("dER/dt (mV/h)", "dE_R/dt"),
                ("dER (mV)", "dE_R"),
                ("dtR (s)", "dt_R"),
                ("Ei (V)", "E_i"),
                ("vs.", "E_i_vs"),
                ("dE/dt", "dE/dt"),
                ("dE/dt unit", "dE/dt_unit"),
                ("Ef (V)", "E_f"),
                ("vs.", "E_f_vs"),
                ("Average over dE", "average_over_dE"),
                E_RANGE[0],
                E_RANGE[1],
                ("I Range", "I_range"),
                ("Bandwidth", "bandwidth"),
            ],
        }],
    },
    Technique {
        name: "GCPL",
        title: "Galvanostatic Cycling with Potential Limitation",
        layouts: &[
            Layout {
                variant: "GCPL (Set I/C)",
                params: &[
                    ("Set I/C", "set_I/C"),
                    ("Is", "I_s"),
                    ("unit Is", "I_s_unit"),
                    ("vs.", "I_s_vs"),
                    ("N", "N"),
                    ("I sign", "I_sign"),
                    ("t1 (h:m:s)", "t_1"),
                    ("I Range", "I_range"),
                    ("Bandwidth", "bandwidth"),
                    ("dE1 (mV)", "dE_1"),
                    ("dt1 (s)", "dt_1"),
                    ("EM (V)", "E_M"),
                    ("tM (h:m:s)", "t_M"),
                    ("Im", "I_m"),
                    ("unit Im", "I_m_unit"),
                    E_RANGE[0],
                    E_RANGE[1],
                    ("dq", "dq"),
                    ("unit dq", "dq_unit"),
                    ("dtq (s)", "dt_q"),
                    ("dQM", "dQ_M"),
                    ("unit dQM", "dQ_M_unit"),
                    ("tR (h:m:s)", "t_R"),
                    ("dER/dt (mV/h)", "dE_R/dt"),
                    ("dER (mV)", "dE_R"),
                    ("dtR (s)", "dt_R"),
                    ("EL (V)", "E_L"),
                    ("goto Ns'", "goto_Ns"),
                    ("nc cycles", "nc_cycles"),
                ],
            },
            Layout {
                variant: "GCPL",
                params: &[
                    ("Is", "I_s"),
                    ("unit Is", "I_s_unit"),
                    ("vs.", "I_s_vs"),
                    ("N", "N"),
                    ("I sign", "I_sign"),
                    ("t1 (h:m:s)", "t_1"),
                    ("I Range", "I_range"),
                    ("Bandwidth", "bandwidth"),
                    ("dE1 (mV)", "dE_1"),
                    ("dt1 (s)", "dt_1"),
                    ("EM (V)", "E_M"),
                    ("tM (h:m:s)", "t_M"),
                    ("Im", "I_m"),
                    ("unit Im", "I_m_unit"),
                    E_RANGE[0],
                    E_RANGE[1],
                    ("dq", "dq"),
                    ("unit dq", "dq_unit"),
                    ("dtq (s)", "dt_q"),
                    ("dQM", "dQ_M"),
                    ("unit dQM", "dQ_M_unit"),
                    ("tR (h:m:s)", "t_R"),
                    ("dER/dt (mV/h)", "dE_R/dt"),
                    ("dER (mV)", "dE_R"),
                    ("dtR (s)", "dt_R"),
                    ("EL (V)", "E_L"),
                    ("goto Ns'", "goto_Ns"),
                    ("nc cycles", "nc_cycles"),
                ],
            },
        ],
    },
    Technique {
        name: "PEIS",
        title: "Potentio Electrochemical Impedance Spectroscopy",
        layouts: &[Layout {
            variant: "PEIS",
            params: &[
                ("E (V)", "E"),
                ("vs.", "E_vs"),
                ("tE (h:m:s)", "t_E"),
                ("record", "record"),
                ("dI", "dI"),
                ("unit dI", "dI_unit"),
                ("dt (s)", "dt"),
                ("fi", "f_i"),
                ("unit fi", "f_i_unit"),
                ("ff", "f_f"),
                ("unit ff", "f_f_unit"),
                ("Nd", "Nd"),
                ("Points", "points"),
                ("spacing", "spacing"),
                ("Va (mV)", "V_a"),
                ("pw", "pw"),
                ("Na", "Na"),
                ("corr", "corr"),
                E_RANGE[0],
                E_RANGE[1],
                ("I Range", "I_range"),
                ("Bandwidth", "bandwidth"),
                ("nc cycles", "nc_cycles"),
                ("goto Ns'", "goto_Ns"),
                ("nr cycles", "nr_cycles"),
                ("inc. cycle", "inc_cycle"),
            ],
        }],
    },
];

/// Trimmed label column of a settings line
pub fn line_label(line: &str) -> String {
    line.chars()
        .take(SETTINGS_COLUMN_WIDTH)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Find a technique by its printed title or short name
pub fn find_technique(title: &str) -> Option<&'static Technique> {
    let title = title.trim();
    CATALOG
        .iter()
        .find(|t| t.title.eq_ignore_ascii_case(title) || t.name.eq_ignore_ascii_case(title))
}

/// Resolve the technique and the layout of its parameter lines.
///
/// Longer layouts are tried first so that a layout which is a suffix of
/// another does not shadow it.
pub fn technique_params(
    title: &str,
    settings_lines: &[&str],
    path: &Path,
) -> Result<(&'static Technique, &'static Layout)> {
    let technique = find_technique(title).ok_or_else(|| {
        ExtractError::format(path, format!("unknown technique '{}'", title.trim()))
    })?;

    let mut layouts: Vec<&Layout> = technique.layouts.iter().collect();
    layouts.sort_by_key(|layout| std::cmp::Reverse(layout.len()));

    layouts
        .into_iter()
        .find(|layout| layout.matches(settings_lines))
        .map(|layout| (technique, layout))
        .ok_or_else(|| {
            ExtractError::format(
                path,
                format!(
                    "settings of technique '{}' match none of {} known layouts",
                    technique.name,
                    technique.layouts.len()
                ),
            )
        })
}
