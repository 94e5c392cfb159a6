use glam::Vec2;

use crate::coords::UnitScale;

/// Parses `"x0,y0,x1,y1,..."` pixel coordinates into physics-space vertices.
///
/// Tokens are consumed in pairs. A token that fails to parse drops its whole
/// pair (with a warning) and parsing resumes at the next pair. A trailing lone
/// x is ignored. The output is reversed so a clockwise screen-space outline
/// becomes counter-clockwise once y is treated as pointing up.
pub fn parse_polygon_coordinates(text: &str, scale: UnitScale) -> Vec<Vec2> {
    let mut vertices = Vec::new();
    let mut tokens = text.split(',').map(str::trim);

    while let Some(x_token) = tokens.next() {
        let Some(y_token) = tokens.next() else {
            break;
        };
        match (x_token.parse::<f32>(), y_token.parse::<f32>()) {
            (Ok(x), Ok(y)) => vertices.push(scale.vec_to_meters(Vec2::new(x, y))),
            _ => {
                log::warn!(
                    "Discarding malformed coordinate pair '{}', '{}'",
                    x_token,
                    y_token
                );
            }
        }
    }

    vertices.reverse();
    vertices
}
