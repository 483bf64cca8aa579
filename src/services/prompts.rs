use crate::db::models::Question;

/// Stands in for the submission when no text could be extracted.
pub(crate) const UNEXTRACTED_SUBMISSION: &str =
    "Student submission text could not be extracted from the document.";

/// Reference material included in session prompts is cut to this many chars.
pub(crate) const MATERIAL_CHAR_LIMIT: usize = 5000;

/// Prefix of `text` holding at most `max_chars` characters.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

pub(crate) fn submission_grading(
    questions: &[Question],
    student_text: &str,
    max_submission_chars: usize,
) -> String {
    let question_list: String = questions
        .iter()
        .enumerate()
        .map(|(index, question)| format!("Question {}: {}\n", index + 1, question.text))
        .collect();

    format!(
        "You are an expert teacher. Grade the student's submission based on the questions below.\n\n\
         QUESTIONS:\n{question_list}\n\
         STUDENT_SUBMISSION:\n{}\n\n\
         For each question, provide a SCORE out of 10 and constructive FEEDBACK. \
         Then provide an overall SCORE summary line in the format:\n\
         OVERALL_SCORE: [X/10]\n\
         Provide results in plain text with the OVERALL_SCORE line included.",
        truncate_chars(student_text, max_submission_chars)
    )
}

pub(crate) fn teach(material: &str, question: &str) -> String {
    format!(
        "You are an expert teacher. Based on the following educational content, answer the \
         student's question clearly and comprehensively.\n\n\
         EDUCATIONAL CONTENT:\n{}\n\n\
         STUDENT QUESTION: {question}\n\n\
         Provide a clear, educational response that:\n\
         1. Directly answers the question\n\
         2. Provides relevant examples from the content\n\
         3. Explains concepts in simple terms\n\
         4. Suggests related topics to explore",
        truncate_chars(material, MATERIAL_CHAR_LIMIT)
    )
}

pub(crate) fn question_paper(
    material: &str,
    num_questions: u32,
    difficulty: &str,
    question_types: &[String],
) -> String {
    format!(
        "You are an expert question paper creator. Based on the provided educational content, \
         create {num_questions} questions of {difficulty} difficulty level.\n\n\
         EDUCATIONAL CONTENT:\n{}\n\n\
         REQUIREMENTS:\n\
         - Create {num_questions} questions\n\
         - Difficulty: {difficulty} (easy/medium/hard)\n\
         - Include these types: {}\n\
         - Format each question clearly with:\n\
         \x20 * Question number\n\
         \x20 * Question text\n\
         \x20 * For MCQ: A) B) C) D) options\n\
         \x20 * Marks: (for reference)\n\n\
         Ensure questions cover important topics from the content and progressively test \
         understanding.\n\n\
         FORMAT YOUR RESPONSE AS:\n\
         ===QUESTION PAPER===\n\
         [Question 1]\n\
         [Question 2]\n\
         ... etc\n\
         ===END PAPER===",
        truncate_chars(material, MATERIAL_CHAR_LIMIT),
        question_types.join(", ")
    )
}

pub(crate) fn answer_grading(question: &str, expected_answer: Option<&str>, answer: &str) -> String {
    let expected = expected_answer
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("Not provided - use your subject expertise");

    format!(
        "You are an expert teacher grading a student's answer. Evaluate the following response \
         and provide detailed feedback.\n\n\
         QUESTION: {question}\n\n\
         EXPECTED ANSWER (if provided): {expected}\n\n\
         STUDENT'S ANSWER: {answer}\n\n\
         EVALUATION CRITERIA:\n\
         1. Correctness - Is the answer factually accurate?\n\
         2. Completeness - Does it address all parts of the question?\n\
         3. Clarity - Is the response clear and well-structured?\n\
         4. Depth - Is there appropriate detail and explanation?\n\n\
         Provide your response in this format:\n\
         SCORE: [X out of 10]\n\
         FEEDBACK: [Detailed constructive feedback]\n\
         STRENGTHS: [What was good about this answer]\n\
         IMPROVEMENTS: [What could be better]\n\
         CORRECT_ANSWER: [Brief correct answer if needed]"
    )
}

pub(crate) fn interview_analysis(context: &str, response: &str) -> String {
    format!(
        "Analyze the following interview response and provide constructive feedback:\n\n\
         Context: {context}\n\
         Response: \"{response}\"\n\n\
         Please evaluate:\n\
         1. Grammar and language usage\n\
         2. Clarity and structure\n\
         3. Completeness of the answer\n\
         4. Key points that might be missing\n\
         5. Overall effectiveness\n\n\
         Provide specific, actionable feedback. If there are errors or areas for improvement, \
         start with \"Correction: \" followed by the specific issue and how to fix it."
    )
}

/// Whether an analysis flags something to fix.
pub(crate) fn has_corrections(analysis: &str) -> bool {
    analysis.to_lowercase().contains("correction:")
}
