// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Ray casting against the height surface of the loaded sections.

use crate::{
    core::{
        algebra::{Vector2, Vector3},
        math::ray::Ray,
    },
    store::SectionStore,
};

/// Closest intersection of a ray with the terrain.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainRayCastResult {
    /// World-space intersection point.
    pub position: Vector3<f32>,
    /// Normal of the hit triangle, always pointing up.
    pub normal: Vector3<f32>,
    /// Section that contains the hit.
    pub section: Vector2<i32>,
    /// Cell of the section that contains the hit, its corner points have offsets `cell` and
    /// `cell + (1; 1)`.
    pub cell: Vector2<u32>,
    /// Ray equation parameter of the intersection in `[0; 1]` range.
    pub toi: f32,
}

impl SectionStore {
    /// Casts the ray segment against every loaded section it passes over and returns the hit
    /// closest to the ray origin. Sections that are not loaded are ignored.
    pub fn raycast(&self, ray: &Ray) -> Option<TerrainRayCastResult> {
        let params = self.parameters();
        let (grid_min, grid_max) = self.bounds();

        let ray_aabb = ray.aabb();
        let first = params
            .section_for_position(Vector2::new(ray_aabb.min.x, ray_aabb.min.z))
            .sup(&grid_min);
        let last = params
            .section_for_position(Vector2::new(ray_aabb.max.x, ray_aabb.max.z))
            .inf(&grid_max);

        let scale = params.scale as f32;
        let mut closest: Option<(f32, TerrainRayCastResult)> = None;
        let mut cells = Vec::new();

        for sy in first.y..=last.y {
            for sx in first.x..=last.x {
                let coord = Vector2::new(sx, sy);
                let Some(section) = self.section(coord) else {
                    continue;
                };

                let origin_point = params.point_for_section_and_offset(coord, Vector2::new(0, 0));
                let origin = params.position_for_point(origin_point);

                cells.clear();
                section
                    .quad_tree()
                    .cells_intersecting_ray(ray, origin, scale, &mut cells);

                let heights = section.heights();
                let stride = section.size() as usize + 1;
                let vertex = |x: u32, y: u32| {
                    Vector3::new(
                        origin.x + x as f32 * scale,
                        heights[y as usize * stride + x as usize],
                        origin.y + y as f32 * scale,
                    )
                };

                for cell in cells.iter() {
                    let v0 = vertex(cell.x, cell.y);
                    let v1 = vertex(cell.x, cell.y + 1);
                    let v2 = vertex(cell.x + 1, cell.y + 1);
                    let v3 = vertex(cell.x + 1, cell.y);

                    for vertices in [[v0, v1, v2], [v2, v3, v0]] {
                        let Some((toi, position)) = ray.triangle_intersection(&vertices) else {
                            continue;
                        };

                        let sqr_distance = (position - ray.origin).norm_squared();
                        if closest
                            .as_ref()
                            .is_some_and(|(distance, _)| *distance <= sqr_distance)
                        {
                            continue;
                        }

                        let mut normal = (vertices[1] - vertices[0])
                            .cross(&(vertices[2] - vertices[0]))
                            .try_normalize(f32::EPSILON)
                            .unwrap_or_else(Vector3::y);
                        if normal.y < 0.0 {
                            normal = -normal;
                        }

                        closest = Some((
                            sqr_distance,
                            TerrainRayCastResult {
                                position,
                                normal,
                                section: coord,
                                cell: *cell,
                                toi,
                            },
                        ));
                    }
                }
            }
        }

        closest.map(|(_, result)| result)
    }
}
