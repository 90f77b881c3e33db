use owo_colors::Rgb;

/// Namespace/name highlight used in status lines, e.g. `default/fleet-a3f9c`.
pub const FG1: Rgb = Rgb(120, 120, 120);
pub const FG2: Rgb = Rgb(0, 200, 160);
