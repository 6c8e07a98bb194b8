/// Make sure bounds are ordered correctly, eg the end of a window is not before its start.
///
pub fn rearrange<N>(lower: N, upper: N) -> (N, N)
where
    N: PartialOrd,
{
    if lower > upper {
        (upper, lower)
    } else {
        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rearrange() {
        assert_eq!(rearrange(3, 7), (3, 7));
        assert_eq!(rearrange(7, 3), (3, 7));
        assert_eq!(rearrange(2.5, -1.0), (-1.0, 2.5));
    }
}
