use crate::gelbooru::MAX_LIMIT;

/// How a query is split into page-sized download rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundPlan {
    /// Posts requested per page.
    pub limit: usize,
    /// Pages fetched, `pid` 0 through `rounds - 1`.
    pub rounds: usize,
}

pub fn clamp_limit(unit: usize) -> usize {
    unit.clamp(1, MAX_LIMIT)
}

/// Never plans past the last page the API can serve, nor past `max_images`.
pub fn plan_rounds(count: usize, max_images: usize, unit: usize) -> RoundPlan {
    let limit = clamp_limit(unit);
    if count == 0 || max_images == 0 {
        return RoundPlan { limit, rounds: 0 };
    }

    let max_pid = count / limit;
    let need_pid = (max_images - 1) / limit;
    RoundPlan {
        limit,
        rounds: max_pid.min(need_pid) + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_is_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(50), 50);
        assert_eq!(clamp_limit(1000), 100);
    }

    #[test]
    fn requested_images_bound_the_rounds() {
        assert_eq!(plan_rounds(10_000, 50, 50), RoundPlan { limit: 50, rounds: 1 });
        assert_eq!(plan_rounds(10_000, 51, 50), RoundPlan { limit: 50, rounds: 2 });
        assert_eq!(plan_rounds(10_000, 250, 100), RoundPlan { limit: 100, rounds: 3 });
    }

    #[test]
    fn available_posts_bound_the_rounds() {
        assert_eq!(plan_rounds(120, 1_000, 50).rounds, 3);
        assert_eq!(plan_rounds(30, 1_000, 50).rounds, 1);
    }

    #[test]
    fn nothing_to_do_plans_nothing() {
        assert_eq!(plan_rounds(0, 50, 50).rounds, 0);
        assert_eq!(plan_rounds(100, 0, 50).rounds, 0);
    }
}
