//! Small LCS-based diffs used in error messages and upload prompts.

/// Pairs of indices `(i, j)` with `a[i] == b[j]` forming a longest common subsequence.
fn common_subsequence<T: PartialEq>(a: &[T], b: &[T]) -> Vec<(usize, usize)> {
	let (n, m) = (a.len(), b.len());
	let mut table = vec![vec![0usize; m + 1]; n + 1];

	for i in (0..n).rev() {
		for j in (0..m).rev() {
			table[i][j] = if a[i] == b[j] {
				table[i + 1][j + 1] + 1
			} else {
				table[i + 1][j].max(table[i][j + 1])
			};
		}
	}

	let mut pairs = Vec::with_capacity(table[0][0]);
	let (mut i, mut j) = (0, 0);
	while i < n && j < m {
		if a[i] == b[j] {
			pairs.push((i, j));
			i += 1;
			j += 1;
		} else if table[i + 1][j] >= table[i][j + 1] {
			i += 1;
		} else {
			j += 1;
		}
	}

	pairs
}

/// Compare two single-line strings the way `ndiff` presents them: the old line
/// prefixed with `- `, the new one with `+ `, each followed by a `? ` guide line
/// marking the characters that differ.
pub fn intraline(old: &str, new: &str) -> Vec<String> {
	let a = old.chars().collect::<Vec<_>>();
	let b = new.chars().collect::<Vec<_>>();
	let pairs = common_subsequence(&a, &b);

	let mut old_marks = vec!['-'; a.len()];
	let mut new_marks = vec!['+'; b.len()];
	for &(i, j) in &pairs {
		old_marks[i] = ' ';
		new_marks[j] = ' ';
	}

	let mut lines = vec![format!("- {old}")];
	if let Some(guide) = guide_line(&old_marks) {
		lines.push(guide);
	}
	lines.push(format!("+ {new}"));
	if let Some(guide) = guide_line(&new_marks) {
		lines.push(guide);
	}

	lines
}

fn guide_line(marks: &[char]) -> Option<String> {
	let guide = marks.iter().collect::<String>();
	let guide = guide.trim_end();
	(!guide.is_empty()).then(|| format!("? {guide}"))
}

/// Line-by-line diff of two texts. Unchanged lines are prefixed with two
/// spaces, removed lines with `- ` and added lines with `+ `.
pub fn lines(old: &str, new: &str) -> Vec<String> {
	let a = old.lines().collect::<Vec<_>>();
	let b = new.lines().collect::<Vec<_>>();
	let pairs = common_subsequence(&a, &b);

	let mut out = Vec::with_capacity(a.len().max(b.len()));
	let (mut i, mut j) = (0, 0);

	for (pi, pj) in pairs.into_iter().chain(std::iter::once((a.len(), b.len()))) {
		out.extend(a[i..pi].iter().map(|line| format!("- {line}")));
		out.extend(b[j..pj].iter().map(|line| format!("+ {line}")));
		if pi < a.len() {
			out.push(format!("  {}", a[pi]));
		}
		i = pi + 1;
		j = pj + 1;
	}

	out
}
